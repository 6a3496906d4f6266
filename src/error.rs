/// Logs the error of a best-effort operation and discards it.
pub trait ResultOkWarnExt<T, E> {
    fn ok_warn(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkWarnExt<T, E> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn ok_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
