pub mod mailer;
pub mod token;

pub use mailer::{
    HttpMailer, LogMailer, MailMessage, Mailer, SmtpMailer, build_smtp_message, mailer_from_config,
};
pub use token::generate_verification_token;
