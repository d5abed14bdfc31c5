//! Reminder message templates.

/// Subject line of reminder emails.
pub const EMAIL_SUBJECT: &str = "Task due";

/// Chat reminder text.
pub fn chat_text(description: &str, due: &str) -> String {
    format!("Hi!,\nYour task {description} should be done now! ({due})\n")
}

/// Email reminder body.
pub fn email_body(description: &str, due: &str) -> String {
    format!(
        "Hi!,\nYour task {description} should be done now! ({due})\n\nBest regards,\n\nThis is your agenda.\n"
    )
}
