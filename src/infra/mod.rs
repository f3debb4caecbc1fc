// Outbound integrations: confirmation mail and email-domain checks

pub mod domain_check;
pub mod mailer;
