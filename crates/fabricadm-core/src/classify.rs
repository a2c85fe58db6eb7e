use crate::CoreError;
use fabricadm_remote::RemoteError;

/// Whether a failed lookup is the operator's mistake rather than an
/// infrastructure fault.
///
/// True for not-found responses, and for invalid-parameters responses citing
/// exactly one field equal to `expected_field`. Every other shape, including
/// invalid-parameters naming several or different fields, is not a user error.
pub fn is_user_error(err: &RemoteError, expected_field: &str) -> bool {
    if err.is_not_found() {
        return true;
    }
    match err.invalid_parameter_fields() {
        Some(fields) => fields.len() == 1 && fields[0] == expected_field,
        None => false,
    }
}

/// Classify a failed lookup of an operator-named object: user errors become
/// [`CoreError::Validation`] carrying `explain()`, anything else a
/// [`CoreError::Client`] for `service`.
pub fn classify_lookup(
    err: RemoteError,
    service: &str,
    expected_field: &str,
    explain: impl FnOnce() -> String,
) -> CoreError {
    if is_user_error(&err, expected_field) {
        tracing::debug!("{service} lookup rejected as user error: {err}");
        CoreError::Validation(explain())
    } else {
        CoreError::client(service, err)
    }
}
