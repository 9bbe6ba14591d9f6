//! `Context` (spec §4.L): the `BuiltinHost` implementation that gives the
//! interpreter everything it cannot see on its own — the resource loader,
//! the buffered post-back, the replay service, and the per-API renderer
//! tables — and drives one replay request end to end.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use gapir_core::{Resource, Severity};
use gapir_resources::CachedResourceLoader;
use gapir_transport::{PostBuffer, ReplayService};
use gapir_vm::{
    BuiltinCall, BuiltinHost, BuiltinOutcome, FunctionTables, Interpreter, MemoryManager, Value, ValueType, VmError,
    VmResult,
};

use crate::error::DaemonResult;
use crate::renderer::{GraphicsCall, Renderer, RendererFactory};
use crate::replay_request::load_replay_request;

/// Post buffer capacity (spec §4.I); a lone post larger than half this
/// bypasses buffering entirely.
const POST_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

pub struct Context {
    loader: CachedResourceLoader,
    resources: Vec<Resource>,
    service: Arc<Mutex<Box<dyn ReplayService>>>,
    post_buffer: PostBuffer<'static>,
    renderer_factory: Box<dyn RendererFactory>,
    renderers: HashMap<u8, Box<dyn Renderer>>,
    last_reported_pct: u32,
}

impl Context {
    pub fn new(service: Box<dyn ReplayService>, loader: CachedResourceLoader, renderer_factory: Box<dyn RendererFactory>) -> Self {
        Self::with_shared_service(Arc::new(Mutex::new(service)), loader, renderer_factory)
    }

    /// As [`Self::new`], but takes a service handle already shared with a
    /// resource fetcher (spec §4.F), so both see the same connection
    /// instead of each opening their own.
    pub fn with_shared_service(service: Arc<Mutex<Box<dyn ReplayService>>>, loader: CachedResourceLoader, renderer_factory: Box<dyn RendererFactory>) -> Self {
        let post_service = service.clone();
        let post_buffer = PostBuffer::new(POST_BUFFER_CAPACITY, move |batch| post_service.lock().send_posts(batch));
        Self {
            loader,
            resources: Vec::new(),
            service,
            post_buffer,
            renderer_factory,
            renderers: HashMap::new(),
            last_reported_pct: 0,
        }
    }

    /// Fetches the payload for `id`, sizes `mm`, and runs it to completion
    /// (spec §4.J/K). Reports a crash-free failure back to the controller
    /// as an error notification before propagating it.
    pub fn run_replay(&mut self, mm: &mut MemoryManager, id: &str) -> DaemonResult<()> {
        let (loaded, words) = {
            let mut guard = self.service.lock();
            load_replay_request(&mut **guard, mm, id)?
        };
        mm.set_volatile_memory(loaded.volatile_memory_size as usize)?;
        self.resources = loaded.resources;
        self.last_reported_pct = 0;

        let mut interpreter = Interpreter::new();
        let result = interpreter.run(mm, &words, self, loaded.stack_size_words as usize);

        self.post_buffer.flush()?;
        match result {
            Ok(()) => {
                self.service.lock().send_replay_finished()?;
                Ok(())
            }
            Err(e) => {
                let _ = self.service.lock().send_error_msg(0, &e.to_string());
                Err(e.into())
            }
        }
    }
}

impl BuiltinHost for Context {
    fn ensure_api_table(&mut self, api_index: u8, tables: &mut FunctionTables) -> VmResult<bool> {
        if !self.renderers.contains_key(&api_index) {
            match self.renderer_factory.create(api_index) {
                Some(renderer) => {
                    self.renderers.insert(api_index, renderer);
                    let table = tables.table_mut(api_index)?;
                    for call in GraphicsCall::ALL {
                        table.insert(api_index, call as u16, graphics_builtin_trampoline)?;
                    }
                }
                None => return Ok(false),
            }
        }
        Ok(self.renderers.get(&api_index).map(|r| r.is_valid()).unwrap_or(false))
    }

    fn post(&mut self, bytes: &[u8]) -> VmResult<()> {
        self.post_buffer.push(bytes).map_err(|e| VmError::BuiltinFailed("POST".into(), e.to_string()))
    }

    fn load_resource(&mut self, index: u32, dst_addr: u64, mm: &mut MemoryManager) -> VmResult<()> {
        let resource = self
            .resources
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VmError::BuiltinFailed("RESOURCE".into(), format!("resource index {index} out of range")))?;
        let size = resource.size as usize;
        let dst = dst_addr as usize;
        let slice = mm
            .bytes_mut()
            .get_mut(dst..dst + size)
            .ok_or(VmError::InvalidAddress { addr: dst_addr, size: resource.size, expected: "volatile" })?;
        self.loader.load(&[resource], slice).map_err(|e| VmError::BuiltinFailed("RESOURCE".into(), e.to_string()))?;
        Ok(())
    }

    fn notify(&mut self, id: u32, label: u32, bytes: &[u8]) -> VmResult<()> {
        self.service
            .lock()
            .send_notification_data(id as u64, 0, label as u64, Severity::Info, bytes)
            .map_err(|e| VmError::BuiltinFailed("NOTIFICATION".into(), e.to_string()))
    }

    fn wait_fence(&mut self, id: u32) -> VmResult<u32> {
        self.service.lock().get_fence_ready(id).map_err(|e| VmError::BuiltinFailed("WAIT".into(), e.to_string()))
    }

    /// Reports progress at each whole-percent boundary, plus the final
    /// instruction, so a long replay's `ReplayStatus` cadence stays
    /// proportional instead of firing on every `CALL` (spec §4.K).
    fn check_replay_status(&mut self, label: u32, total: u32, current: u32) {
        if total == 0 {
            return;
        }
        let pct = ((current as u64 * 100) / total as u64) as u32;
        let at_end = current + 1 >= total;
        if pct <= self.last_reported_pct && !at_end {
            return;
        }
        self.last_reported_pct = pct;
        if let Err(e) = self.service.lock().send_replay_status(label as u64, total, current) {
            tracing::warn!("failed to send replay status: {e}");
        }
    }

    fn invoke_graphics_builtin(&mut self, api_index: u8, func_id: u16, args: &[u8]) -> VmResult<i32> {
        let renderer = self
            .renderers
            .get_mut(&api_index)
            .ok_or(VmError::UnknownFunction { api: api_index, id: func_id })?;
        crate::renderer::dispatch(renderer.as_mut(), func_id, args)
    }
}

/// The one generic handler registered for every graphics builtin id: pops
/// the `(argSize, argPtr)` pair every such call shares, reads the blob, and
/// hands it to the host for renderer dispatch (spec §4.L).
fn graphics_builtin_trampoline(call: &mut BuiltinCall) -> VmResult<BuiltinOutcome> {
    let size = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(size) = size else { unreachable!() };
    let src = call.stack.pop_pointer(call.mm)?;
    let bytes = call.mm.read(src, size as usize)?.to_vec();
    let code = call.host.invoke_graphics_builtin(call.api_index, call.func_id, &bytes)?;
    Ok(BuiltinOutcome::Return(Value::Int32(code)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::CreateOutcome;
    use gapir_transport::{PayloadData, PostPiece, TransportResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedService {
        payload: PayloadData,
        posts: Vec<PostPiece>,
        finished: bool,
    }

    impl ReplayService for FixedService {
        fn get_payload(&mut self, _id: &str) -> TransportResult<PayloadData> {
            Ok(self.payload.clone())
        }
        fn get_resources(&mut self, _ids: &[String], _total: u64) -> TransportResult<Vec<u8>> {
            unimplemented!()
        }
        fn get_fence_ready(&mut self, id: u32) -> TransportResult<u32> {
            Ok(id)
        }
        fn send_posts(&mut self, mut posts: Vec<PostPiece>) -> TransportResult<()> {
            self.posts.append(&mut posts);
            Ok(())
        }
        fn send_replay_status(&mut self, _label: u64, _total: u32, _done: u32) -> TransportResult<()> {
            Ok(())
        }
        fn send_notification_data(&mut self, _id: u64, _api: u32, _label: u64, _sev: Severity, _bytes: &[u8]) -> TransportResult<()> {
            Ok(())
        }
        fn send_crash_dump(&mut self, _path: &str, _bytes: Vec<u8>) -> TransportResult<()> {
            Ok(())
        }
        fn send_replay_finished(&mut self) -> TransportResult<()> {
            self.finished = true;
            Ok(())
        }
    }

    struct NoRenderers;
    impl RendererFactory for NoRenderers {
        fn create(&self, _api_index: u8) -> Option<Box<dyn Renderer>> {
            None
        }
    }

    struct OneRenderer {
        calls: Arc<AtomicUsize>,
    }
    struct CountingRenderer {
        calls: Arc<AtomicUsize>,
    }
    impl Renderer for CountingRenderer {
        fn api(&self) -> u8 {
            1
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn on_debug_message(&mut self, _severity: Severity, _message: &str) {}
        fn create_instance(&mut self, _req: &crate::renderer::CreateRequest) -> CreateOutcome {
            CreateOutcome::Success(0)
        }
        fn create_device(&mut self, _req: &crate::renderer::CreateRequest) -> CreateOutcome {
            CreateOutcome::Success(0)
        }
        fn invoke(&mut self, _call: GraphicsCall, _args: &[u8]) -> i32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            7
        }
    }
    impl RendererFactory for OneRenderer {
        fn create(&self, api_index: u8) -> Option<Box<dyn Renderer>> {
            if api_index == 1 {
                Some(Box::new(CountingRenderer { calls: self.calls.clone() }))
            } else {
                None
            }
        }
    }

    fn loader() -> CachedResourceLoader {
        use gapir_resources::{MemoryCache, MockFetcher};
        let fetcher = Arc::new(MockFetcher::new());
        CachedResourceLoader::new(MemoryCache::new(4096, fetcher.clone()), fetcher)
    }

    #[test]
    fn runs_a_trivial_replay_and_reports_finished() {
        let service = FixedService {
            payload: PayloadData { stack_size: 16, volatile_memory_size: 256, constants: vec![], opcodes: vec![], resources: vec![] },
            posts: vec![],
            finished: false,
        };
        let service: Arc<Mutex<Box<dyn ReplayService>>> = Arc::new(Mutex::new(Box::new(service)));
        let post_service = service.clone();
        let mut ctx = Context {
            loader: loader(),
            resources: vec![],
            service: service.clone(),
            post_buffer: PostBuffer::new(POST_BUFFER_CAPACITY, move |batch| post_service.lock().send_posts(batch)),
            renderer_factory: Box::new(NoRenderers),
            renderers: HashMap::new(),
            last_reported_pct: 0,
        };
        let mut mm = MemoryManager::new(&[1 << 16]).unwrap();
        ctx.run_replay(&mut mm, "ignored").unwrap();
    }

    #[test]
    fn graphics_builtin_dispatches_through_renderer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = Context::new(
            Box::new(FixedService {
                payload: PayloadData { stack_size: 16, volatile_memory_size: 4096, constants: vec![], opcodes: vec![], resources: vec![] },
                posts: vec![],
                finished: false,
            }),
            loader(),
            Box::new(OneRenderer { calls: calls.clone() }),
        );
        let mut tables = FunctionTables::new();
        assert!(ctx.ensure_api_table(1, &mut tables).unwrap());
        let mut mm = MemoryManager::new(&[1 << 16]).unwrap();
        mm.set_replay_data_size(0, 0).unwrap();
        mm.set_volatile_memory(4096).unwrap();

        let code = ctx.invoke_graphics_builtin(1, GraphicsCall::RegisterVkInstance as u16, &[]).unwrap();
        assert_eq!(code, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trampoline_reads_blob_and_returns_status() {
        use gapir_vm::Stack;
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = Context::new(
            Box::new(FixedService {
                payload: PayloadData { stack_size: 16, volatile_memory_size: 4096, constants: vec![], opcodes: vec![], resources: vec![] },
                posts: vec![],
                finished: false,
            }),
            loader(),
            Box::new(OneRenderer { calls: calls.clone() }),
        );
        let mut mm = MemoryManager::new(&[1 << 16]).unwrap();
        mm.set_replay_data_size(0, 0).unwrap();
        mm.set_volatile_memory(4096).unwrap();
        let addr = mm.volatile_to_absolute(0).unwrap();
        mm.write(addr, b"abcd").unwrap();

        let mut tables = FunctionTables::new();
        ctx.ensure_api_table(1, &mut tables).unwrap();

        let mut stack = Stack::new(8);
        stack.push(&mm, Value::VolatilePointer(0));
        stack.push(&mm, Value::Uint32(4));
        let mut call = BuiltinCall {
            stack: &mut stack,
            mm: &mut mm,
            host: &mut ctx,
            label: 0,
            api_index: 1,
            func_id: GraphicsCall::RegisterVkInstance as u16,
        };
        match graphics_builtin_trampoline(&mut call).unwrap() {
            BuiltinOutcome::Return(Value::Int32(v)) => assert_eq!(v, 7),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
