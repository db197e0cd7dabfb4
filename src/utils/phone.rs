/// Canonical 10-digit form used to match logins against `employees.contact`.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 12 && digits.starts_with("91") {
        return digits[2..].to_string();
    }
    if digits.len() == 11 && digits.starts_with('0') {
        return digits[1..].to_string();
    }
    digits
}

/// WhatsApp participant id with the country code, e.g. `919876543210`.
pub fn whatsapp_participant(phone: &str) -> Option<String> {
    let normalized = normalize_phone(phone);
    (!normalized.is_empty()).then(|| format!("91{}", normalized))
}

pub fn whatsapp_chat_id(phone: &str) -> Option<String> {
    whatsapp_participant(phone).map(|p| format!("{}@c.us", p))
}
