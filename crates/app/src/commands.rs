use services::auth::{AuthGateway, CurrentUser, Session};
use services::resource::{AsyncResource, NotificationSink, ResourceOptions, FALLBACK_ERROR_MESSAGE};
use std::io::Write;
use std::sync::Arc;

pub async fn login(auth: &AuthGateway, out: &mut dyn Write) -> anyhow::Result<Session> {
    let session = auth.try_login().await?;
    writeln!(
        out,
        "Signed in with {} as user {}",
        auth.provider(),
        session.user_id
    )?;
    Ok(session)
}

pub async fn logout(auth: &AuthGateway, out: &mut dyn Write) -> anyhow::Result<()> {
    auth.try_logout().await?;
    writeln!(out, "Signed out")?;
    Ok(())
}

/// Load the current user through an [`AsyncResource`] and print it once the
/// fetch settles. Failures are reported through `notifier`.
pub async fn whoami(
    auth: &AuthGateway,
    notifier: Arc<dyn NotificationSink>,
    json: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let gateway = auth.clone();
    let resource = AsyncResource::new(
        ResourceOptions::new(move || {
            let gateway = gateway.clone();
            async move { Ok(gateway.try_current_user().await?) }
        }),
        notifier,
    );

    let state = resource.settled().await;
    if let Some(error) = state.error {
        anyhow::bail!(error);
    }
    let Some(user) = state.data else {
        anyhow::bail!(FALLBACK_ERROR_MESSAGE);
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&user)?)?;
    } else {
        print_user(&user, out)?;
    }
    Ok(())
}

fn print_user(user: &CurrentUser, out: &mut dyn Write) -> std::io::Result<()> {
    let profile = &user.profile;
    if profile.email.is_empty() {
        writeln!(out, "{}", profile.name)?;
    } else {
        writeln!(out, "{} <{}>", profile.name, profile.email)?;
    }
    writeln!(out, "id:     {}", profile.id)?;
    if let Some(avatar) = &user.avatar {
        writeln!(out, "avatar: {avatar}")?;
    }
    Ok(())
}
