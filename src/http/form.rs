//! Credential form decoding (`application/x-www-form-urlencoded`).
//!
//! Fields are read from the query string first, then the body. The key
//! `email` is the username. The password is the field named `password` if
//! present, otherwise the last non-email field; any of them may repeat, in
//! which case the values are concatenated in arrival order.

use url::form_urlencoded;

use crate::provider::Credentials;

pub const USERNAME_FIELD: &str = "email";
pub const PASSWORD_FIELD: &str = "password";

#[derive(Debug, PartialEq, Eq)]
pub enum FormError {
    MissingUsername,
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::MissingUsername => write!(f, "missing '{}' field", USERNAME_FIELD),
        }
    }
}

impl std::error::Error for FormError {}

/// Build credentials from a query string and/or form body.
pub fn parse_credentials(query: Option<&str>, body: &[u8]) -> Result<Credentials, FormError> {
    let mut username = String::new();
    let mut named_password: Option<String> = None;
    let mut other: Option<(String, String)> = None;

    let query_pairs = query
        .map(|q| form_urlencoded::parse(q.as_bytes()))
        .into_iter()
        .flatten();
    let body_pairs = form_urlencoded::parse(body);

    for (k, v) in query_pairs.chain(body_pairs) {
        if k == USERNAME_FIELD {
            username.push_str(&v);
        } else if k == PASSWORD_FIELD {
            named_password.get_or_insert_with(String::new).push_str(&v);
        } else {
            let repeated = matches!(&other, Some((key, _)) if *key == k);
            match other.as_mut() {
                Some((_, val)) if repeated => val.push_str(&v),
                _ => other = Some((k.into_owned(), v.into_owned())),
            }
        }
    }

    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(FormError::MissingUsername);
    }
    let password = named_password
        .or_else(|| other.map(|(_, v)| v))
        .unwrap_or_default();
    Ok(Credentials::new(username, password))
}
