use core::fmt;

/// Hardware errors that abort a control loop step.
///
/// `O` is the error type of the relay and indicator pins, `D` the one of the
/// display.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<O, D> {
    /// Setting the relay or indicator output failed.
    Output(O),
    /// Updating the display failed.
    Display(D),
}

impl<O: fmt::Debug, D: fmt::Debug> fmt::Display for Error<O, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(e) => write!(f, "Output pin error: {:?}", e),
            Self::Display(e) => write!(f, "Display error: {:?}", e),
        }
    }
}
