//! The graphics renderer facade (spec §4.N) and the generic graphics
//! builtin dispatch that wires it into the interpreter (spec §4.L).
//!
//! Renderer construction, driver loading and window-system surface
//! management are explicitly outside the core (spec §4.N) and a
//! Non-goal (spec §1 "no graphics-semantics interpretation"), so this
//! module only defines the seam: a `Renderer` trait the daemon's own
//! driver glue would implement, and the opaque-blob-in/status-code-out
//! calling convention every graphics builtin shares.

use gapir_core::Severity;
use gapir_vm::{VmError, VmResult};

/// One named graphics builtin (spec §4.L's list). Ids are this crate's
/// own numbering; the compiler's actual opaque ids are a build-time
/// concern outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum GraphicsCall {
    CreateVkInstance = 0x0100,
    CreateVkDevice = 0x0101,
    RegisterVkInstance = 0x0102,
    DestroyVkInstance = 0x0103,
    UnregisterVkInstance = 0x0104,
    RegisterVkDevice = 0x0105,
    UnregisterVkDevice = 0x0106,
    RegisterCommandBuffers = 0x0107,
    UnregisterCommandBuffers = 0x0108,
    CreateSwapchain = 0x0109,
    AllocateImageMemory = 0x010a,
    EnumeratePhysicalDevices = 0x010b,
    GetFenceStatus = 0x010c,
    GetEventStatus = 0x010d,
    WaitForFences = 0x010e,
    CreateVkDebugReportCallback = 0x010f,
    DestroyVkDebugReportCallback = 0x0110,
}

impl GraphicsCall {
    pub const ALL: [GraphicsCall; 17] = [
        GraphicsCall::CreateVkInstance,
        GraphicsCall::CreateVkDevice,
        GraphicsCall::RegisterVkInstance,
        GraphicsCall::DestroyVkInstance,
        GraphicsCall::UnregisterVkInstance,
        GraphicsCall::RegisterVkDevice,
        GraphicsCall::UnregisterVkDevice,
        GraphicsCall::RegisterCommandBuffers,
        GraphicsCall::UnregisterCommandBuffers,
        GraphicsCall::CreateSwapchain,
        GraphicsCall::AllocateImageMemory,
        GraphicsCall::EnumeratePhysicalDevices,
        GraphicsCall::GetFenceStatus,
        GraphicsCall::GetEventStatus,
        GraphicsCall::WaitForFences,
        GraphicsCall::CreateVkDebugReportCallback,
        GraphicsCall::DestroyVkDebugReportCallback,
    ];

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u16 == id)
    }
}

/// The outcome of an instance/device creation attempt. Device creation
/// never produces `MissingLayerOrExtension`: spec §9 open question (i)
/// calls out that asymmetry explicitly and asks for it to be reproduced
/// as-is rather than unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Success(i32),
    MissingLayerOrExtension,
    Failure(i32),
}

/// A create-instance/create-device request that may carry validation
/// layers or debug-report extensions the retry logic can drop.
pub struct CreateRequest {
    pub validation_layers: Vec<String>,
    pub debug_extensions: Vec<String>,
}

impl CreateRequest {
    fn wants_stripping(&self) -> bool {
        !self.validation_layers.is_empty() || !self.debug_extensions.is_empty()
    }

    fn strip(&mut self) {
        self.validation_layers.clear();
        self.debug_extensions.clear();
    }
}

/// The graphics-API-specific provider of a builtin table and a
/// debug-message listener (spec §4.N).
pub trait Renderer: Send {
    fn api(&self) -> u8;
    fn is_valid(&self) -> bool;
    fn on_debug_message(&mut self, severity: Severity, message: &str);

    fn create_instance(&mut self, req: &CreateRequest) -> CreateOutcome;
    fn create_device(&mut self, req: &CreateRequest) -> CreateOutcome;

    /// Every other graphics builtin: an opaque blob in, a status code
    /// out. The renderer alone knows how to interpret `args`.
    fn invoke(&mut self, call: GraphicsCall, args: &[u8]) -> i32;
}

/// Constructs a renderer for an API index the interpreter has not yet
/// seen (spec §4.K "api-request callback").
pub trait RendererFactory: Send {
    fn create(&self, api_index: u8) -> Option<Box<dyn Renderer>>;
}

/// The factory a daemon started without a compiled-in graphics driver
/// uses: every api-request callback reports "no renderer available" and
/// builtin dispatch for that API fails gracefully, per §4.N's contract.
/// A real deployment links a driver-backed `RendererFactory` in its
/// place; none ships here since driver loading is outside the core.
pub struct NullRendererFactory;

impl RendererFactory for NullRendererFactory {
    fn create(&self, _api_index: u8) -> Option<Box<dyn Renderer>> {
        None
    }
}

/// `CreateVkInstance`: retries once, stripping validation layers/debug
/// extensions, on either a distinct missing-layer report or a plain
/// failure while the request still carries them.
pub fn create_instance_with_retry(renderer: &mut dyn Renderer, mut req: CreateRequest) -> i32 {
    match renderer.create_instance(&req) {
        CreateOutcome::Success(code) => code,
        CreateOutcome::MissingLayerOrExtension => retry_instance(renderer, &mut req),
        CreateOutcome::Failure(code) => {
            if req.wants_stripping() {
                retry_instance(renderer, &mut req)
            } else {
                code
            }
        }
    }
}

fn retry_instance(renderer: &mut dyn Renderer, req: &mut CreateRequest) -> i32 {
    renderer.on_debug_message(Severity::Debug, "retrying instance creation without validation layers/debug extensions");
    req.strip();
    match renderer.create_instance(req) {
        CreateOutcome::Success(code) => code,
        CreateOutcome::Failure(code) => {
            renderer.on_debug_message(Severity::Error, "instance creation failed after retry");
            code
        }
        CreateOutcome::MissingLayerOrExtension => {
            renderer.on_debug_message(Severity::Error, "instance creation still missing a layer or extension after retry");
            -1
        }
    }
}

/// `CreateVkDevice`: same retry shape as instance creation, but device
/// creation never reports the missing-layer case distinctly (spec §9
/// open question (i)) — only `Success`/`Failure` are expected here.
pub fn create_device_with_retry(renderer: &mut dyn Renderer, mut req: CreateRequest) -> i32 {
    match renderer.create_device(&req) {
        CreateOutcome::Success(code) => code,
        CreateOutcome::Failure(code) => {
            if !req.wants_stripping() {
                return code;
            }
            renderer.on_debug_message(Severity::Debug, "retrying device creation without validation layers/debug extensions");
            req.strip();
            match renderer.create_device(&req) {
                CreateOutcome::Success(c) => c,
                CreateOutcome::Failure(c) => {
                    renderer.on_debug_message(Severity::Error, "device creation failed after retry");
                    c
                }
                CreateOutcome::MissingLayerOrExtension => code,
            }
        }
        CreateOutcome::MissingLayerOrExtension => code_for_unexpected_device_report(),
    }
}

fn code_for_unexpected_device_report() -> i32 {
    -1
}

/// Generic dispatcher a `BuiltinHost::invoke_graphics_builtin`
/// implementation can delegate to once it has resolved the renderer for
/// `api_index`: looks up the named call and forwards to it, decoding
/// `CreateRequest` for the two calls that need retry semantics.
pub fn dispatch(renderer: &mut dyn Renderer, func_id: u16, args: &[u8]) -> VmResult<i32> {
    let call = GraphicsCall::from_id(func_id).ok_or(VmError::UnknownFunction { api: renderer.api(), id: func_id })?;
    Ok(match call {
        GraphicsCall::CreateVkInstance => create_instance_with_retry(renderer, decode_create_request(args)),
        GraphicsCall::CreateVkDevice => create_device_with_retry(renderer, decode_create_request(args)),
        other => renderer.invoke(other, args),
    })
}

/// Decodes the validation-layer/debug-extension lists a create request
/// carries. The wire shape for these two calls is JSON (unlike every
/// other graphics call's opaque blob) purely so this crate does not need
/// to invent a bespoke binary layout for a Non-goal's worth of
/// Vulkan-specific argument marshaling; see DESIGN.md.
fn decode_create_request(args: &[u8]) -> CreateRequest {
    #[derive(serde::Deserialize, Default)]
    struct Wire {
        #[serde(default)]
        validation_layers: Vec<String>,
        #[serde(default)]
        debug_extensions: Vec<String>,
    }
    let wire: Wire = serde_json::from_slice(args).unwrap_or_default();
    CreateRequest { validation_layers: wire.validation_layers, debug_extensions: wire.debug_extensions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedRenderer {
        api: u8,
        instance_outcomes: RefCell<Vec<CreateOutcome>>,
        device_outcomes: RefCell<Vec<CreateOutcome>>,
        debug_messages: RefCell<Vec<String>>,
    }

    impl Renderer for ScriptedRenderer {
        fn api(&self) -> u8 {
            self.api
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn on_debug_message(&mut self, _severity: Severity, message: &str) {
            self.debug_messages.borrow_mut().push(message.to_string());
        }
        fn create_instance(&mut self, _req: &CreateRequest) -> CreateOutcome {
            self.instance_outcomes.borrow_mut().remove(0)
        }
        fn create_device(&mut self, _req: &CreateRequest) -> CreateOutcome {
            self.device_outcomes.borrow_mut().remove(0)
        }
        fn invoke(&mut self, _call: GraphicsCall, _args: &[u8]) -> i32 {
            0
        }
    }

    fn req_with_layers() -> CreateRequest {
        CreateRequest { validation_layers: vec!["VK_LAYER_KHRONOS_validation".into()], debug_extensions: vec![] }
    }

    #[test]
    fn instance_creation_succeeds_without_retry() {
        let mut r = ScriptedRenderer {
            api: 1,
            instance_outcomes: RefCell::new(vec![CreateOutcome::Success(0)]),
            device_outcomes: RefCell::new(vec![]),
            debug_messages: RefCell::new(vec![]),
        };
        assert_eq!(create_instance_with_retry(&mut r, req_with_layers()), 0);
        assert!(r.debug_messages.borrow().is_empty());
    }

    #[test]
    fn instance_creation_retries_after_missing_layer() {
        let mut r = ScriptedRenderer {
            api: 1,
            instance_outcomes: RefCell::new(vec![CreateOutcome::MissingLayerOrExtension, CreateOutcome::Success(0)]),
            device_outcomes: RefCell::new(vec![]),
            debug_messages: RefCell::new(vec![]),
        };
        assert_eq!(create_instance_with_retry(&mut r, req_with_layers()), 0);
        assert_eq!(r.debug_messages.borrow().len(), 1);
    }

    #[test]
    fn instance_creation_without_layers_does_not_retry_on_failure() {
        let mut r = ScriptedRenderer {
            api: 1,
            instance_outcomes: RefCell::new(vec![CreateOutcome::Failure(-7)]),
            device_outcomes: RefCell::new(vec![]),
            debug_messages: RefCell::new(vec![]),
        };
        let bare = CreateRequest { validation_layers: vec![], debug_extensions: vec![] };
        assert_eq!(create_instance_with_retry(&mut r, bare), -7);
        assert!(r.debug_messages.borrow().is_empty());
    }

    #[test]
    fn device_creation_retries_then_fails_without_distinct_report() {
        let mut r = ScriptedRenderer {
            api: 2,
            instance_outcomes: RefCell::new(vec![]),
            device_outcomes: RefCell::new(vec![CreateOutcome::Failure(-1), CreateOutcome::Failure(-2)]),
            debug_messages: RefCell::new(vec![]),
        };
        assert_eq!(create_device_with_retry(&mut r, req_with_layers()), -2);
        assert_eq!(r.debug_messages.borrow().len(), 2);
    }

    #[test]
    fn dispatch_routes_create_instance_through_retry_path() {
        let mut r = ScriptedRenderer {
            api: 1,
            instance_outcomes: RefCell::new(vec![CreateOutcome::Success(3)]),
            device_outcomes: RefCell::new(vec![]),
            debug_messages: RefCell::new(vec![]),
        };
        let args = serde_json::to_vec(&serde_json::json!({"validation_layers": [], "debug_extensions": []})).unwrap();
        assert_eq!(dispatch(&mut r, GraphicsCall::CreateVkInstance as u16, &args).unwrap(), 3);
    }

    #[test]
    fn dispatch_rejects_unknown_func_id() {
        let mut r = ScriptedRenderer {
            api: 1,
            instance_outcomes: RefCell::new(vec![]),
            device_outcomes: RefCell::new(vec![]),
            debug_messages: RefCell::new(vec![]),
        };
        assert!(dispatch(&mut r, 0xDEAD, &[]).is_err());
    }
}
