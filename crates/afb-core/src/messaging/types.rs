use crate::Result;

/// Outcome of a best-effort side effect (restart confirmation, admin notice).
///
/// Callers inspect it for logging and then drop it; a failure never changes
/// control flow.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed { reason: String },
}

impl Delivery {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Delivery::Delivered,
            Err(e) => Delivery::Failed {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}
