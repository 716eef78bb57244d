use mm_domain::error::Error;

/// Transport failure talking to the generation backend.  Timeouts stay
/// distinguishable so callers can log them apart from refused or broken
/// connections.
pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("llm: {e}"))
    } else {
        Error::Http(format!("llm: {e}"))
    }
}
