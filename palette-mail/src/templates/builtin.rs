//! Built-in templates available to every user

use std::collections::HashMap;

use crate::templates::types::EmailTemplate;

const BASE_STYLE: &str = r#"<style>
  body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
  .container { max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #eee; }
  .header { background-color: #4a6cf7; color: white; padding: 20px; text-align: center; }
  .content { padding: 20px; }
  .button { display: inline-block; background-color: #4a6cf7; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px; margin-top: 20px; }
  .footer { text-align: center; margin-top: 20px; font-size: 12px; color: #888; }
</style>"#;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n{}\n</head>\n<body>\n<div class=\"container\">\n{}\n</div>\n</body>\n</html>\n",
        title, BASE_STYLE, body
    )
}

fn builtin(
    id: &str,
    name: &str,
    description: &str,
    subject: &str,
    html: String,
    variables: &[&str],
) -> EmailTemplate {
    EmailTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        subject: subject.to_string(),
        html,
        variables: variables.iter().map(|v| v.to_string()).collect(),
        default_values: HashMap::new(),
        blocks: None,
        is_public: true,
        owner_id: None,
        created_at: None,
        updated_at: None,
    }
}

fn welcome() -> EmailTemplate {
    builtin(
        "welcome",
        "Welcome Email",
        "Send a welcome email to new users",
        "Welcome to Our Service!",
        page(
            "Welcome to Our Service",
            r#"<div class="header"><h1>Welcome, {{name}}!</h1></div>
<div class="content">
  <p>Thank you for joining our service. We're excited to have you on board!</p>
  <p>Your account has been created successfully with the email: {{email}}</p>
  <a href="{{loginLink}}" class="button">Login to Your Account</a>
</div>
<div class="footer"><p>You're receiving this email because you signed up for our service.</p></div>"#,
        ),
        &["name", "email", "loginLink"],
    )
}

fn newsletter() -> EmailTemplate {
    builtin(
        "newsletter",
        "Monthly Newsletter",
        "Send a monthly newsletter to subscribers",
        "{{month}} Newsletter - Updates and News",
        page(
            "Monthly Newsletter",
            r#"<div class="header"><h1>{{month}} Newsletter</h1></div>
<div class="content">
  <p>Hello {{name}},</p>
  <p>Here are the latest updates and news for {{month}}:</p>
  <h2>{{headline1}}</h2><p>{{content1}}</p>
  <h2>{{headline2}}</h2><p>{{content2}}</p>
  <h2>{{headline3}}</h2><p>{{content3}}</p>
  <p>Thank you for your continued support!</p>
</div>
<div class="footer"><p><a href="{{unsubscribeLink}}">Unsubscribe</a></p></div>"#,
        ),
        &[
            "name",
            "month",
            "headline1",
            "content1",
            "headline2",
            "content2",
            "headline3",
            "content3",
            "unsubscribeLink",
        ],
    )
}

fn password_reset() -> EmailTemplate {
    builtin(
        "password-reset",
        "Password Reset",
        "Send a password reset link to users",
        "Reset Your Password",
        page(
            "Reset Your Password",
            r#"<div class="header"><h1>Reset Your Password</h1></div>
<div class="content">
  <p>Hello {{name}},</p>
  <p>We received a request to reset your password. Click the button below to create a new password:</p>
  <a href="{{resetLink}}" class="button">Reset Password</a>
  <p>If you didn't request a password reset, you can ignore this email.</p>
  <p>This link will expire in 1 hour for security reasons.</p>
</div>"#,
        ),
        &["name", "resetLink"],
    )
}

fn interview_invitation() -> EmailTemplate {
    let mut template = builtin(
        "interview-invitation",
        "Interview Invitation",
        "Send an interview invitation to candidates",
        "Interview Invitation - {{position}} at {{company}}",
        page(
            "Interview Invitation",
            r#"<div class="header"><a href="{{logoLink}}">{{company}}</a></div>
<div class="content">
  <p><strong>{{candidateName}}</strong></p>
  <p>We are pleased to invite you to interview for the <strong>{{position}}</strong> role at {{company}}.</p>
  <p>When: {{interviewDate}} {{interviewTime}}</p>
  <p>Where: {{interviewLocation}}</p>
  <p>Note: {{interviewNotes}}</p>
  <p>Phone: {{contactPhone}}<br>
  Email: <a href="mailto:{{contactEmail}}">{{contactEmail}}</a><br>
  <a href="{{contactLink}}">{{contactMethod}}</a></p>
</div>
<div class="footer"><p>{{departmentName}} DEPARTMENT</p><p>{{companyDescription}}</p></div>"#,
        ),
        &[
            "candidateName",
            "position",
            "company",
            "interviewDate",
            "interviewTime",
            "interviewLocation",
            "interviewNotes",
            "contactPhone",
            "contactEmail",
            "contactMethod",
            "contactLink",
            "departmentName",
            "companyDescription",
            "logoLink",
        ],
    );

    template.default_values = [
        ("position", "Software Engineer"),
        ("company", "ACME"),
        ("interviewTime", "9:00 AM"),
        ("interviewLocation", "Room 402"),
        ("interviewNotes", "Bring your CV and portfolio"),
        ("contactPhone", "+1 555 0100"),
        ("contactEmail", "recruiting@example.com"),
        ("contactMethod", "Website"),
        ("contactLink", "#"),
        ("departmentName", "ENGINEERING"),
        ("companyDescription", "ACME"),
        ("logoLink", "#"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    template
}

/// All built-in templates, in display order
pub fn builtin_templates() -> Vec<EmailTemplate> {
    vec![welcome(), newsletter(), password_reset(), interview_invitation()]
}

/// Look up a built-in template by its slug
pub fn builtin_template(id: &str) -> Option<EmailTemplate> {
    builtin_templates().into_iter().find(|t| t.id == id)
}
