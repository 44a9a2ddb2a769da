// src/services/messages.rs
//
// User-facing texts. All Markdown (legacy Telegram flavour).

use chrono::{DateTime, Utc};

use crate::models::{Branding, LabTest, Patient};

pub const COMMAND_MENU: &str = "I understand the following commands:\n\n\
/start +1234567890 - Connect your phone number\n\
/help - Show this help\n\
/status - Check your connection status\n\
/stop - Disconnect from notifications";

pub const INVALID_PHONE: &str = "❌ Invalid phone number format. Please use international format:\n\n\
Example: /start +251911234567";

pub const PHONE_NOT_FOUND: &str = "❌ Phone number not found in our system.\n\n\
Please contact the hospital to register your phone number, or verify you entered it correctly.";

pub const CONNECT_FAILED: &str = "❌ Failed to connect your account. Please try again later.";

pub const STATUS_NOT_CONNECTED: &str = "❌ You are not connected to any patient account.\n\n\
Use /start +your_phone_number to connect.";

pub const STATUS_FAILED: &str = "❌ Unable to check status. Please try again later.";

pub const STOP_NOT_CONNECTED: &str = "You are not connected to any account.";

pub const DISCONNECTED: &str = "✅ Successfully disconnected from notifications.\n\n\
You will no longer receive lab results here. Use /start +your_phone_number to reconnect anytime.";

pub const DISCONNECT_FAILED: &str = "❌ Failed to disconnect. Please try again later.";

pub const GENERIC_FAILURE: &str = "❌ An error occurred. Please try again later.";

pub fn welcome(branding: &Branding) -> String {
    format!(
        "Welcome to {} Lab Notification Bot! 🏥\n\n\
         To connect your account, please use:\n/start +your_phone_number\n\n\
         Example: /start +251911234567",
        branding.name
    )
}

/// Backslash-escapes the legacy Markdown control characters so stored
/// names and references render literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn connected(full_name: &str) -> String {
    let full_name = escape_markdown(full_name);
    format!(
        "✅ Successfully connected!\n\n\
         Hello {full_name}, you will now receive lab results and medical notifications here.\n\n\
         Use /help to see available commands."
    )
}

pub fn help(branding: &Branding) -> String {
    let mut text = format!(
        "🏥 *{} Lab Bot Help*\n\n\
         *Available Commands:*\n\
         /start +phone - Connect your phone number\n\
         /help - Show this help message\n\
         /status - Check your connection status\n\
         /stop - Disconnect from notifications\n\n\
         *About This Bot:*\n\
         This bot delivers your lab results and medical notifications securely. \
         Your data is protected and only you will receive your results.",
        branding.name
    );
    if let Some(contact) = &branding.contact {
        text.push_str(&format!(
            "\n\n*Need Help?*\nContact {} at {}",
            branding.name, contact
        ));
    }
    text
}

pub fn status(patient: &Patient, total: usize, delivered: usize) -> String {
    format!(
        "✅ *Connection Status*\n\n\
         *Patient:* {}\n\
         *Phone:* {}\n\
         *Status:* Connected\n\
         *Connected Since:* {}\n\n\
         *Notification Stats:*\n\
         📊 Total Received: {total}\n\
         ✅ Successfully Delivered: {delivered}\n\n\
         You will receive lab results and medical notifications here automatically.",
        escape_markdown(&patient.full_name),
        escape_markdown(patient.phone.as_deref().unwrap_or("-")),
        short_date(patient.updated_at),
    )
}

/// Wraps a staff-written message in the institution header and footer.
pub fn branded(branding: &Branding, message: &str) -> String {
    let mut text = format!(
        "🏥 *{name}*\n\n{message}\n\n---\n\
         This is an automated message from {name} Lab Department.",
        name = branding.name
    );
    if let Some(contact) = &branding.contact {
        text.push_str(&format!(" \nIf you have questions, please contact us at {contact}"));
    }
    text
}

/// Body for a "results available" notification.
pub fn test_result(patient: &Patient, test: &LabTest) -> String {
    let summary = test
        .result_summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\n- Summary: {}", escape_markdown(s)))
        .unwrap_or_default();

    format!(
        "📋 *Lab Test Results Available*\n\n\
         Dear {name},\n\n\
         Your {test_name} results are now ready.\n\n\
         *Test Details:*\n\
         - Test Type: {test_type}\n\
         - Status: {status}{summary}\n\n\
         Please visit the hospital to collect your detailed results or consult with your doctor.\n\n\
         *Next Steps:*\n\
         1. Visit the lab department during working hours (8:00 AM - 5:00 PM)\n\
         2. Bring your ID and test reference number ({reference})\n\
         3. Consult with your doctor about the results",
        name = escape_markdown(&patient.full_name),
        test_name = escape_markdown(&test.test_name),
        test_type = escape_markdown(&test.test_type),
        status = escape_markdown(test.status.as_str()),
        reference = escape_markdown(&test.test_id),
    )
}

fn short_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
