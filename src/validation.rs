use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.len();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Repository names become a path segment under both base directories.
pub fn check_repo_name(value: &str) -> Result<(), ApiError> {
    check_length("repository.name", value, 1, 100)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ApiError::BadRequest(
            "repository.name must contain only alphanumeric characters, hyphens, underscores, or dots"
                .into(),
        ));
    }
    if value == "." || value == ".." || value.starts_with('-') {
        return Err(ApiError::BadRequest(format!(
            "repository.name '{value}' is not a valid directory name"
        )));
    }
    Ok(())
}

pub fn check_clone_url(value: &str) -> Result<(), ApiError> {
    check_length("repository.clone_url", value, 1, 2048)?;
    if value.starts_with('-') || value.contains('\0') || value.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("repository.clone_url is not a valid URL".into()));
    }
    Ok(())
}
