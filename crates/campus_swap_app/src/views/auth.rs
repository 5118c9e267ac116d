//! Login and registration forms. Both validate locally before any request
//! and store the session on success.

use campus_swap_client::{ApiClient, ClientError, Credentials, Registration, SessionStore, User};

fn required(value: &str, label: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::validation(format!("{} is required", label)));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        required(&self.email, "Email")?;
        required(&self.password, "Password")
    }

    pub async fn submit(&self, api: &ApiClient, session: &SessionStore) -> Result<User, ClientError> {
        self.validate()?;
        let credentials = Credentials {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };
        let auth = api.login(&credentials).await.map_err(|e| {
            tracing::error!(error = %e, "login error");
            e
        })?;
        session.set_session(&auth.token, &auth.user)?;
        Ok(auth.user)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub course: String,
    pub year: Option<String>,
    pub contact_info: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), ClientError> {
        required(&self.name, "Name")?;
        required(&self.email, "Email")?;
        required(&self.password, "Password")?;
        if self.password != self.confirm_password {
            return Err(ClientError::validation("Passwords do not match"));
        }
        Ok(())
    }

    pub async fn submit(&self, api: &ApiClient, session: &SessionStore) -> Result<User, ClientError> {
        self.validate()?;
        let registration = Registration {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            course: self.course.trim().to_string(),
            year: self.year.clone().filter(|y| !y.trim().is_empty()),
            contact_info: self.contact_info.trim().to_string(),
        };
        let auth = api.register(&registration).await?;
        session.set_session(&auth.token, &auth.user)?;
        Ok(auth.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> RegisterForm {
        RegisterForm {
            name: "Sam".into(),
            email: "sam@uni.edu".into(),
            password: "pw1".into(),
            confirm_password: "pw1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn password_mismatch_is_rejected() {
        let mut form = filled();
        assert!(form.validate().is_ok());
        form.confirm_password = "pw2".into();
        let err = form.validate().unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let mut form = filled();
        form.name = "  ".into();
        assert_eq!(form.validate().unwrap_err().to_string(), "Name is required");
        assert!(LoginForm::new("", "x").validate().is_err());
        assert!(LoginForm::new("a@b.com", "").validate().is_err());
    }
}
