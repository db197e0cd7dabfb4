use chrono::NaiveDate;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_color(status: &str) -> &'static str {
    if status == "Approved" { "#10b981" } else { "#ef4444" }
}

pub fn otp_email(otp: &str) -> String {
    format!("<h1>Your MarkwaveHR login OTP is: {}</h1>", escape_html(otp))
}

pub fn otp_whatsapp(otp: &str) -> String {
    format!("Your MarkwaveHR login OTP is: {}", otp)
}

/// Approval request sent to reviewers of a leave or WFH application.
pub struct ReviewRequest<'a> {
    /// "Leave" or "WFH"
    pub kind: &'a str,
    pub employee_name: &'a str,
    pub employee_code: &'a str,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Extra rows shown above the reason, e.g. leave type and days
    pub details: Vec<(&'a str, String)>,
    pub reason: &'a str,
    pub approve_url: String,
    pub reject_url: String,
}

impl ReviewRequest<'_> {
    pub fn subject(&self) -> String {
        format!(
            "{} Request - {} ({})",
            self.kind, self.employee_name, self.employee_code
        )
    }

    pub fn render(&self) -> String {
        let mut rows = format!(
            r#"<tr><td style="color:#666;font-size:13px;font-weight:bold;">PERIOD:</td><td style="text-align:right;font-weight:bold;">{} to {}</td></tr>"#,
            self.from, self.to
        );
        for (label, value) in &self.details {
            rows.push_str(&format!(
                r#"<tr><td style="color:#666;font-size:13px;font-weight:bold;">{}:</td><td style="text-align:right;font-weight:bold;">{}</td></tr>"#,
                escape_html(label),
                escape_html(value)
            ));
        }
        rows.push_str(&format!(
            r#"<tr><td style="color:#666;font-size:13px;font-weight:bold;vertical-align:top;">REASON:</td><td style="text-align:right;font-weight:bold;">{}</td></tr>"#,
            escape_html(self.reason)
        ));

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="margin:0;padding:20px;font-family:Arial,sans-serif;background-color:#f5f5f5;">
<table width="100%" cellpadding="0" cellspacing="0" style="max-width:600px;margin:0 auto;background-color:#ffffff;border-radius:8px;">
<tr><td style="background-color:#48327d;padding:30px;text-align:center;"><h1 style="color:#ffffff;margin:0;font-size:24px;">{kind} Application</h1></td></tr>
<tr><td style="padding:30px;">
<p>Hello,</p>
<p><strong>{name} ({code})</strong> has submitted a {kind} request.</p>
<table width="100%" cellpadding="10" cellspacing="0" style="background-color:#f8f9fa;border-radius:8px;">{rows}</table>
<p style="text-align:center;margin:30px 0;">
<a href="{approve}" style="display:inline-block;background-color:#10b981;color:#ffffff;padding:15px 40px;text-decoration:none;border-radius:6px;font-weight:bold;">APPROVE</a>
<a href="{reject}" style="display:inline-block;background-color:#ef4444;color:#ffffff;padding:15px 40px;text-decoration:none;border-radius:6px;font-weight:bold;">REJECT</a>
</p>
<p style="font-size:12px;color:#999999;text-align:center;">This is an automated notification from MarkwaveHR.</p>
</td></tr>
</table>
</body>
</html>"#,
            kind = escape_html(self.kind),
            name = escape_html(self.employee_name),
            code = escape_html(self.employee_code),
            rows = rows,
            approve = self.approve_url,
            reject = self.reject_url,
        )
    }
}

/// Sent to the employee after a reviewer decides.
pub fn status_update(kind: &str, status: &str, from: NaiveDate, to: NaiveDate) -> (String, String) {
    let subject = format!("{} Request Update - {}", kind, status);
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family:Arial,sans-serif;">
<h2>{kind} Request {status}</h2>
<p>Your {kind} request has been <strong style="color:{color};">{lower}</strong>.</p>
<p><strong>Dates:</strong> {from} to {to}</p>
</body>
</html>"#,
        kind = kind,
        status = status,
        color = status_color(status),
        lower = status.to_lowercase(),
        from = from,
        to = to,
    );
    (subject, body)
}

fn page(title: &str, icon: &str, color: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="margin:0;display:flex;justify-content:center;align-items:center;min-height:100vh;background-color:#f8fafc;font-family:system-ui,sans-serif;">
<div style="background:white;padding:40px;border-radius:20px;text-align:center;max-width:400px;width:90%;">
<div style="width:80px;height:80px;background-color:{color};color:white;border-radius:50%;display:flex;justify-content:center;align-items:center;font-size:40px;margin:0 auto 24px;">{icon}</div>
<h1 style="color:#1e293b;margin:0 0 8px;font-size:24px;">{title}</h1>
<p style="color:#64748b;margin:0;">{message}</p>
</div>
</body>
</html>"#
    )
}

pub fn action_done_page(kind: &str, status: &str) -> String {
    let icon = if status == "Approved" { "&#10003;" } else { "&#10005;" };
    page(
        &format!("{} {}", kind, status),
        icon,
        status_color(status),
        &format!("The {} request has been successfully updated. You can close this window now.", kind),
    )
}

pub fn already_processed_page(kind: &str, status: &str) -> String {
    page(
        "Request Already Processed",
        "i",
        "#64748b",
        &format!(
            "This {} request has already been marked as <strong>{}</strong>.",
            kind,
            escape_html(status)
        ),
    )
}

pub fn error_page(message: &str) -> String {
    page("Unable to process", "!", "#ef4444", &escape_html(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn review_request_escapes_user_text_and_embeds_links() {
        let req = ReviewRequest {
            kind: "WFH",
            employee_name: "Asha Rao",
            employee_code: "MW-001",
            from: date(2),
            to: date(3),
            details: vec![],
            reason: "<script>alert(1)</script>",
            approve_url: "http://hr/wfh/email-action/4/approve?token=t".into(),
            reject_url: "http://hr/wfh/email-action/4/reject?token=t".into(),
        };

        let html = req.render();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("/wfh/email-action/4/approve?token=t"));
        assert!(html.contains("2026-03-02 to 2026-03-03"));
        assert_eq!(req.subject(), "WFH Request - Asha Rao (MW-001)");
    }

    #[test]
    fn status_update_uses_status_colour() {
        let (subject, body) = status_update("Leave", "Rejected", date(2), date(2));
        assert_eq!(subject, "Leave Request Update - Rejected");
        assert!(body.contains("#ef4444"));
        assert!(body.contains("rejected"));
    }
}
