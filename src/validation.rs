use crate::{
    error::ValidationError,
    models::{LoginRequest, QuizAnswers, RegisterUserRequest, ResetPasswordRequest, Role},
};
use chrono::{Datelike, NaiveDate};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_AGE_YEARS: u32 = 13;

/// validate_registration
///
/// Sign-up form rules, checked before anything is sent to the auth vendor.
/// The role must be one the gate can route.
pub fn validate_registration(req: &RegisterUserRequest) -> Result<(), ValidationError> {
    let required = [
        &req.first_name,
        &req.last_name,
        &req.email,
        &req.password,
        &req.confirm_password,
    ];
    if required.iter().any(|field| field.trim().is_empty()) {
        return Err(ValidationError::MissingFields);
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    if req.password != req.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    if !req.terms_accepted {
        return Err(ValidationError::TermsNotAccepted);
    }
    if Role::parse(&req.role) == Role::Unknown {
        return Err(ValidationError::UnknownRole(req.role.clone()));
    }
    Ok(())
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ValidationError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok(())
}

/// validate_new_password
///
/// Same password rules as sign-up, applied to the reset form.
pub fn validate_new_password(req: &ResetPasswordRequest) -> Result<(), ValidationError> {
    if req.password.is_empty() || req.confirm_password.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    if req.password != req.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    Ok(())
}

/// Whole years between `birth` and `today`; one less if this year's
/// birthday has not been reached yet.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// validate_quiz
///
/// The quiz only gates on the birth date: it must be present, not in the
/// future, and put the user at `MIN_AGE_YEARS` or older.
pub fn validate_quiz(answers: &QuizAnswers, today: NaiveDate) -> Result<(), ValidationError> {
    let birth = answers.birth_date.ok_or(ValidationError::MissingBirthDate)?;
    if birth > today {
        return Err(ValidationError::BirthDateInFuture);
    }
    if age_on(birth, today) < MIN_AGE_YEARS {
        return Err(ValidationError::TooYoung(MIN_AGE_YEARS));
    }
    Ok(())
}
