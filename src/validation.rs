// src/validation.rs
//
// Payload checks that run in the handlers, before anything reaches a service.
// Each impl returns the payload with text fields trimmed.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::error::AppError;
use crate::models::task::{TaskChanges, TaskDraft};
use crate::models::user::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest, UpdateProfileRequest,
};

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 1000;
pub const CATEGORY_MAX: usize = 50;
pub const TAG_MAX: usize = 30;
pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;

pub trait Validate: Sized {
    fn validate(self) -> Result<Self, AppError>;
}

fn length_between(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            return Err(AppError::validation(format!("{} is required", field)));
        }
        return Err(AppError::validation(format!(
            "{} must be at least {} characters long",
            field, min
        )));
    }
    if len > max {
        return Err(AppError::validation(format!(
            "{} must be at most {} characters long",
            field, max
        )));
    }
    Ok(())
}

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

fn check_tags(tags: Vec<String>) -> Result<Vec<String>, AppError> {
    tags.into_iter()
        .map(|tag| {
            let tag = trimmed(tag);
            length_between("tag", &tag, 1, TAG_MAX)?;
            Ok(tag)
        })
        .collect()
}

fn check_category(category: String) -> Result<String, AppError> {
    let category = trimmed(category);
    length_between("category", &category, 1, CATEGORY_MAX)?;
    Ok(category)
}

fn check_description(description: String) -> Result<String, AppError> {
    let description = trimmed(description);
    length_between("description", &description, 0, DESCRIPTION_MAX)?;
    Ok(description)
}

fn check_title(title: String) -> Result<String, AppError> {
    let title = trimmed(title);
    length_between("title", &title, 1, TITLE_MAX)?;
    Ok(title)
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"))
}

/// Trims and lower-cases an address, rejecting anything that is not shaped
/// like one.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if !email_pattern().is_match(&email) {
        return Err(AppError::validation("email must be a valid email"));
    }
    Ok(email)
}

fn check_password(field: &str, password: &str) -> Result<(), AppError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(AppError::validation(format!(
            "{} must be at least {} characters long",
            field, PASSWORD_MIN
        )));
    }
    Ok(())
}

fn check_name(name: String) -> Result<String, AppError> {
    let name = trimmed(name);
    length_between("name", &name, NAME_MIN, NAME_MAX)?;
    Ok(name)
}

fn check_avatar(avatar: &str) -> Result<(), AppError> {
    match Url::parse(avatar) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppError::validation("avatar must be a valid uri")),
    }
}

/// Rejects an empty id list, as bulk endpoints require at least one id.
pub fn require_ids(ids: &[String]) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::validation("taskIds must contain at least 1 item"));
    }
    Ok(())
}

impl Validate for TaskDraft {
    fn validate(self) -> Result<Self, AppError> {
        Ok(TaskDraft {
            title: check_title(self.title)?,
            description: self.description.map(check_description).transpose()?,
            category: self.category.map(check_category).transpose()?,
            tags: self.tags.map(check_tags).transpose()?,
            ..self
        })
    }
}

impl Validate for TaskChanges {
    fn validate(self) -> Result<Self, AppError> {
        if self.is_empty() {
            return Err(AppError::validation("at least one field must be provided"));
        }
        Ok(TaskChanges {
            title: self.title.map(check_title).transpose()?,
            description: self.description.map(check_description).transpose()?,
            category: self.category.map(check_category).transpose()?,
            tags: self.tags.map(check_tags).transpose()?,
            ..self
        })
    }
}

impl Validate for RegisterRequest {
    fn validate(self) -> Result<Self, AppError> {
        check_password("password", &self.password)?;
        Ok(RegisterRequest {
            name: check_name(self.name)?,
            email: normalize_email(&self.email)?,
            password: self.password,
        })
    }
}

impl Validate for LoginRequest {
    fn validate(self) -> Result<Self, AppError> {
        if self.password.is_empty() {
            return Err(AppError::validation("password is required"));
        }
        Ok(LoginRequest {
            email: normalize_email(&self.email)?,
            password: self.password,
        })
    }
}

impl Validate for UpdateProfileRequest {
    fn validate(self) -> Result<Self, AppError> {
        if self.name.is_none() && self.avatar.is_none() {
            return Err(AppError::validation("at least one field must be provided"));
        }
        if let Some(Some(avatar)) = &self.avatar {
            check_avatar(avatar)?;
        }
        Ok(UpdateProfileRequest {
            name: self.name.map(check_name).transpose()?,
            avatar: self.avatar,
        })
    }
}

impl Validate for ChangePasswordRequest {
    fn validate(self) -> Result<Self, AppError> {
        if self.current_password.is_empty() {
            return Err(AppError::validation("currentPassword is required"));
        }
        check_password("newPassword", &self.new_password)?;
        Ok(self)
    }
}

impl Validate for ForgotPasswordRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(ForgotPasswordRequest {
            email: normalize_email(&self.email)?,
        })
    }
}

impl Validate for ResetPasswordRequest {
    fn validate(self) -> Result<Self, AppError> {
        check_password("password", &self.password)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_is_trimmed() {
        let draft = TaskDraft {
            title: "  Buy milk ".into(),
            category: Some(" Home ".into()),
            tags: Some(vec![" errand".into()]),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(draft.title, "Buy milk");
        assert_eq!(draft.category.as_deref(), Some("Home"));
        assert_eq!(draft.tags, Some(vec!["errand".to_string()]));
    }

    #[test]
    fn draft_limits() {
        assert!(TaskDraft::titled("   ").validate().is_err());
        assert!(TaskDraft::titled("x".repeat(TITLE_MAX)).validate().is_ok());
        assert!(TaskDraft::titled("x".repeat(TITLE_MAX + 1)).validate().is_err());

        let long_tag = TaskDraft {
            tags: Some(vec!["t".repeat(TAG_MAX + 1)]),
            ..TaskDraft::titled("ok")
        };
        assert!(long_tag.validate().is_err());

        let long_category = TaskDraft {
            category: Some("c".repeat(CATEGORY_MAX + 1)),
            ..TaskDraft::titled("ok")
        };
        assert!(long_category.validate().is_err());

        let empty_description = TaskDraft {
            description: Some(String::new()),
            ..TaskDraft::titled("ok")
        };
        assert!(empty_description.validate().is_ok());
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(TaskChanges::default().validate().is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a@b").is_err());
    }

    #[test]
    fn register_checks_every_field() {
        let ok = RegisterRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "secret".into(),
        };
        assert!(ok.validate().is_ok());

        let short_password = RegisterRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "12345".into(),
        };
        assert!(short_password.validate().is_err());

        let short_name = RegisterRequest {
            name: "A".into(),
            email: "ada@example.com".into(),
            password: "secret".into(),
        };
        assert!(short_name.validate().is_err());
    }

    #[test]
    fn avatar_must_be_a_web_url() {
        let bad = UpdateProfileRequest {
            name: None,
            avatar: Some(Some("ftp://host/pic.png".into())),
        };
        assert!(bad.validate().is_err());

        let cleared = UpdateProfileRequest {
            name: None,
            avatar: Some(None),
        };
        assert!(cleared.validate().is_ok());
        assert!(UpdateProfileRequest::default().validate().is_err());
    }
}
