//! Builtin templates compiled into the binary.

/// Builtin content for a full template key, e.g. `email.powered-by.body`.
pub fn builtin(key: &str) -> Option<&'static str> {
    let content = match key {
        "email.cx-survey-public-user.body" => include_str!("../../templates/email/cx-survey-public-user.body.tmpl"),
        "email.cx-survey-public-user.subject" => include_str!("../../templates/email/cx-survey-public-user.subject.tmpl"),
        "email.powered-by.body" => include_str!("../../templates/email/powered-by.body.tmpl"),
        "email.service-request-changed-assignee-staff-user.body" => include_str!("../../templates/email/service-request-changed-assignee-staff-user.body.tmpl"),
        "email.service-request-changed-assignee-staff-user.subject" => include_str!("../../templates/email/service-request-changed-assignee-staff-user.subject.tmpl"),
        "email.service-request-changed-status-staff-user.body" => include_str!("../../templates/email/service-request-changed-status-staff-user.body.tmpl"),
        "email.service-request-changed-status-staff-user.subject" => include_str!("../../templates/email/service-request-changed-status-staff-user.subject.tmpl"),
        "email.service-request-closed-public-user.body" => include_str!("../../templates/email/service-request-closed-public-user.body.tmpl"),
        "email.service-request-closed-public-user.subject" => include_str!("../../templates/email/service-request-closed-public-user.subject.tmpl"),
        "email.service-request-closed-staff-user.body" => include_str!("../../templates/email/service-request-closed-staff-user.body.tmpl"),
        "email.service-request-closed-staff-user.subject" => include_str!("../../templates/email/service-request-closed-staff-user.subject.tmpl"),
        "email.service-request-comment-broadcast-public-user.body" => include_str!("../../templates/email/service-request-comment-broadcast-public-user.body.tmpl"),
        "email.service-request-comment-broadcast-public-user.subject" => include_str!("../../templates/email/service-request-comment-broadcast-public-user.subject.tmpl"),
        "email.service-request-comment-broadcast-staff-user.body" => include_str!("../../templates/email/service-request-comment-broadcast-staff-user.body.tmpl"),
        "email.service-request-comment-broadcast-staff-user.subject" => include_str!("../../templates/email/service-request-comment-broadcast-staff-user.subject.tmpl"),
        "email.service-request-new-public-user.body" => include_str!("../../templates/email/service-request-new-public-user.body.tmpl"),
        "email.service-request-new-public-user.subject" => include_str!("../../templates/email/service-request-new-public-user.subject.tmpl"),
        "email.service-request-new-staff-user.body" => include_str!("../../templates/email/service-request-new-staff-user.body.tmpl"),
        "email.service-request-new-staff-user.subject" => include_str!("../../templates/email/service-request-new-staff-user.subject.tmpl"),
        "email.unsubscribe.body" => include_str!("../../templates/email/unsubscribe.body.tmpl"),
        "sms.cx-survey-public-user.body" => include_str!("../../templates/sms/cx-survey-public-user.body.tmpl"),
        "sms.powered-by.body" => include_str!("../../templates/sms/powered-by.body.tmpl"),
        "sms.service-request-closed-public-user.body" => include_str!("../../templates/sms/service-request-closed-public-user.body.tmpl"),
        "sms.service-request-comment-broadcast-public-user.body" => include_str!("../../templates/sms/service-request-comment-broadcast-public-user.body.tmpl"),
        "sms.service-request-new-public-user.body" => include_str!("../../templates/sms/service-request-new-public-user.body.tmpl"),
        "sms.unsubscribe.body" => include_str!("../../templates/sms/unsubscribe.body.tmpl"),
        _ => return None,
    };
    Some(content)
}
