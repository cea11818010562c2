use uuid::Uuid;

use crate::models::common::Role;

#[derive(Debug, thiserror::Error)]
#[error("Email delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// A fully rendered invite email, ready for whatever transport the caller
/// injects. The accept link carries the bearer token; viewing the accept
/// page needs no session, accepting does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub accept_url: String,
    pub login_url: String,
    pub signup_url: String,
}

pub fn accept_url(base_url: &str, token: Uuid) -> String {
    format!("{}/organizations/invites/{}/accept", base_url, token)
}

pub fn render_invite_email(
    to: &str,
    org_name: &str,
    role: Role,
    token: Uuid,
    base_url: &str,
) -> InviteEmail {
    let accept_url = accept_url(base_url, token);
    let login_url = format!("{}/accounts/login", base_url);
    let signup_url = format!("{}/accounts/signup", base_url);
    let subject = format!("Invite to join {}", org_name);
    let body = format!(
        "Hello,\n\n\
         You have been invited to join the organization '{}' as {}.\n\n\
         Accept Invitation: {}\n\n\
         If you don't yet have an account:\n\
           - Register here: {}\n\
           - Already have an account? Login here: {}\n\n\
         Once you log in or register using this email, the invite will be \
         automatically applied.\n\n\
         Best regards,\n\
         {} Team",
        org_name, role.label(), accept_url, signup_url, login_url, org_name
    );
    InviteEmail {
        to: to.to_string(),
        subject,
        body,
        accept_url,
        login_url,
        signup_url,
    }
}

/// Dev transport: logs the email instead of sending it. Real deployments
/// inject an SMTP/provider transport with the same shape.
pub async fn log_delivery(email: InviteEmail) -> Result<(), DeliveryError> {
    tracing::info!(to = %email.to, subject = %email.subject, "invite email (log transport)");
    Ok(())
}
