/// Command sent to a running upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop dispatching new part uploads, in-flight ones continue.
    Pause,
    /// Resume dispatching part uploads.
    Resume,
    /// Abort the whole upload.
    Abort,
}
