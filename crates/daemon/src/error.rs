//! Top-level daemon errors (spec §7): wraps every lower crate's error type
//! so `Context`/`main` have one thing to match on, the way the teacher's
//! outermost layer collapses into a single error before `anyhow`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Vm(#[from] gapir_vm::VmError),

    #[error(transparent)]
    Resource(#[from] gapir_resources::ResourceError),

    #[error(transparent)]
    Transport(#[from] gapir_transport::TransportError),

    #[error(transparent)]
    Core(#[from] gapir_core::CoreError),

    #[error("renderer for api index {0} is not valid")]
    RendererInvalid(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
