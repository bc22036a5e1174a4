use serde::Serialize;

/// JSON body of a failed JSON request.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    success: bool,
    message: String,
}

impl ApiResponse {
    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}
