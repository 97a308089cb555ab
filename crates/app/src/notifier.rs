use services::resource::NotificationSink;

/// Prints failures as `title: message` on stderr
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}
