//! FFI adapter over the compiler-service client library.
//!
//! The daemon ships a C client library which is loaded from a configured
//! dynamic-library path. The contract mirrors the sourcekitd C shape:
//! requests are UID-keyed object trees, responses are variants walked with
//! `_apply_f`-style visitors (function pointer + context, no blocks), and
//! unsolicited notifications arrive on a registered handler. A response that
//! is an error of kind `connection-interrupted` (or a null response on the
//! notification channel) means the daemon died.
//!
//! Object ownership follows the C library: request objects are released by
//! the sender after the call, `set_value`/`set_string` copy or retain their
//! argument, and responses are disposed by whoever received them.
//!
//! A process-wide registry deduplicates loaded libraries by canonical path so
//! multiple workers share one connection: the first requester opens, the last
//! releaser closes.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use libloading::Library;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::service::{CompilerService, Notification};
use crate::uid::{Uid, Vocabulary};
use crate::value::Value;

/// Opaque request/response object handle.
type SkdObject = *mut c_void;

/// Response variant, passed by value.
#[repr(C)]
#[derive(Clone, Copy)]
struct SkdVariant {
    data: [u64; 3],
}

type ArrayApplier = unsafe extern "C" fn(usize, SkdVariant, *mut c_void) -> bool;
type DictApplier = unsafe extern "C" fn(u64, SkdVariant, *mut c_void) -> bool;
type NotificationHandler = unsafe extern "C" fn(SkdObject, *mut c_void);

// sourcekitd_error_t
const ERROR_CONNECTION_INTERRUPTED: c_int = 1;
const ERROR_REQUEST_CANCELLED: c_int = 4;

// sourcekitd_variant_type_t
const VARIANT_TYPE_NULL: c_int = 0;
const VARIANT_TYPE_DICTIONARY: c_int = 1;
const VARIANT_TYPE_ARRAY: c_int = 2;
const VARIANT_TYPE_INT64: c_int = 3;
const VARIANT_TYPE_STRING: c_int = 4;
const VARIANT_TYPE_UID: c_int = 5;
const VARIANT_TYPE_BOOL: c_int = 6;

/// Append sentinel for `request_array_set_*`.
const ARRAY_APPEND: usize = usize::MAX;

/// The resolved C symbol table.
///
/// Plain function pointers: `Copy`, `Send` and `Sync`, valid for as long as
/// the `Library` that produced them is alive.
#[derive(Clone, Copy)]
struct Api {
    initialize: unsafe extern "C" fn(),
    shutdown: unsafe extern "C" fn(),
    uid_get_from_cstr: unsafe extern "C" fn(*const c_char) -> u64,

    request_dictionary_create:
        unsafe extern "C" fn(*const u64, *const SkdObject, usize) -> SkdObject,
    request_dictionary_set_string: unsafe extern "C" fn(SkdObject, u64, *const c_char),
    request_dictionary_set_int64: unsafe extern "C" fn(SkdObject, u64, i64),
    request_dictionary_set_uid: unsafe extern "C" fn(SkdObject, u64, u64),
    request_dictionary_set_value: unsafe extern "C" fn(SkdObject, u64, SkdObject),
    request_array_create: unsafe extern "C" fn(*const SkdObject, usize) -> SkdObject,
    request_array_set_string: unsafe extern "C" fn(SkdObject, usize, *const c_char),
    request_array_set_value: unsafe extern "C" fn(SkdObject, usize, SkdObject),
    request_release: unsafe extern "C" fn(SkdObject),

    send_request_sync: unsafe extern "C" fn(SkdObject) -> SkdObject,

    response_is_error: unsafe extern "C" fn(SkdObject) -> bool,
    response_error_get_kind: unsafe extern "C" fn(SkdObject) -> c_int,
    response_error_get_description: unsafe extern "C" fn(SkdObject) -> *const c_char,
    response_get_value: unsafe extern "C" fn(SkdObject) -> SkdVariant,
    response_dispose: unsafe extern "C" fn(SkdObject),

    variant_get_type: unsafe extern "C" fn(SkdVariant) -> c_int,
    variant_string_get_ptr: unsafe extern "C" fn(SkdVariant) -> *const c_char,
    variant_int64_get_value: unsafe extern "C" fn(SkdVariant) -> i64,
    variant_bool_get_value: unsafe extern "C" fn(SkdVariant) -> bool,
    variant_uid_get_value: unsafe extern "C" fn(SkdVariant) -> u64,
    variant_array_apply_f: unsafe extern "C" fn(SkdVariant, ArrayApplier, *mut c_void) -> bool,
    variant_dictionary_apply_f: unsafe extern "C" fn(SkdVariant, DictApplier, *mut c_void) -> bool,

    set_notification_handler_f: unsafe extern "C" fn(Option<NotificationHandler>, *mut c_void),
}

fn sym<T: Copy>(lib: &Library, name: &str) -> ServiceResult<T> {
    // SAFETY: the caller pairs each name with its C signature; a mismatch is
    // a broken client library, which we cannot detect beyond presence.
    unsafe { lib.get::<T>(name.as_bytes()) }
        .map(|s| *s)
        .map_err(|_| ServiceError::MissingRequiredSymbol(name.to_string()))
}

impl Api {
    fn load(lib: &Library) -> ServiceResult<Self> {
        Ok(Self {
            initialize: sym(lib, "sourcekitd_initialize")?,
            shutdown: sym(lib, "sourcekitd_shutdown")?,
            uid_get_from_cstr: sym(lib, "sourcekitd_uid_get_from_cstr")?,
            request_dictionary_create: sym(lib, "sourcekitd_request_dictionary_create")?,
            request_dictionary_set_string: sym(lib, "sourcekitd_request_dictionary_set_string")?,
            request_dictionary_set_int64: sym(lib, "sourcekitd_request_dictionary_set_int64")?,
            request_dictionary_set_uid: sym(lib, "sourcekitd_request_dictionary_set_uid")?,
            request_dictionary_set_value: sym(lib, "sourcekitd_request_dictionary_set_value")?,
            request_array_create: sym(lib, "sourcekitd_request_array_create")?,
            request_array_set_string: sym(lib, "sourcekitd_request_array_set_string")?,
            request_array_set_value: sym(lib, "sourcekitd_request_array_set_value")?,
            request_release: sym(lib, "sourcekitd_request_release")?,
            send_request_sync: sym(lib, "sourcekitd_send_request_sync")?,
            response_is_error: sym(lib, "sourcekitd_response_is_error")?,
            response_error_get_kind: sym(lib, "sourcekitd_response_error_get_kind")?,
            response_error_get_description: sym(lib, "sourcekitd_response_error_get_description")?,
            response_get_value: sym(lib, "sourcekitd_response_get_value")?,
            response_dispose: sym(lib, "sourcekitd_response_dispose")?,
            variant_get_type: sym(lib, "sourcekitd_variant_get_type")?,
            variant_string_get_ptr: sym(lib, "sourcekitd_variant_string_get_ptr")?,
            variant_int64_get_value: sym(lib, "sourcekitd_variant_int64_get_value")?,
            variant_bool_get_value: sym(lib, "sourcekitd_variant_bool_get_value")?,
            variant_uid_get_value: sym(lib, "sourcekitd_variant_uid_get_value")?,
            variant_array_apply_f: sym(lib, "sourcekitd_variant_array_apply_f")?,
            variant_dictionary_apply_f: sym(lib, "sourcekitd_variant_dictionary_apply_f")?,
            set_notification_handler_f: sym(lib, "sourcekitd_set_notification_handler_f")?,
        })
    }
}

/// Decode a response variant into an owned [`Value`] tree.
unsafe fn decode_variant(api: &Api, variant: SkdVariant) -> Value {
    match (api.variant_get_type)(variant) {
        VARIANT_TYPE_INT64 => Value::Int((api.variant_int64_get_value)(variant)),
        VARIANT_TYPE_BOOL => Value::Bool((api.variant_bool_get_value)(variant)),
        VARIANT_TYPE_UID => Value::Uid(Uid::from_raw((api.variant_uid_get_value)(variant))),
        VARIANT_TYPE_STRING => {
            let ptr = (api.variant_string_get_ptr)(variant);
            if ptr.is_null() {
                Value::Null
            } else {
                Value::String(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
        VARIANT_TYPE_ARRAY => {
            struct Ctx<'a> {
                api: &'a Api,
                items: Vec<Value>,
            }
            unsafe extern "C" fn visit(_index: usize, value: SkdVariant, ctx: *mut c_void) -> bool {
                let ctx = &mut *(ctx as *mut Ctx<'_>);
                ctx.items.push(decode_variant(ctx.api, value));
                true
            }
            let mut ctx = Ctx {
                api,
                items: Vec::new(),
            };
            (api.variant_array_apply_f)(variant, visit, &mut ctx as *mut Ctx<'_> as *mut c_void);
            Value::Array(ctx.items)
        }
        VARIANT_TYPE_DICTIONARY => {
            struct Ctx<'a> {
                api: &'a Api,
                entries: HashMap<Uid, Value>,
            }
            unsafe extern "C" fn visit(key: u64, value: SkdVariant, ctx: *mut c_void) -> bool {
                let ctx = &mut *(ctx as *mut Ctx<'_>);
                ctx.entries
                    .insert(Uid::from_raw(key), decode_variant(ctx.api, value));
                true
            }
            let mut ctx = Ctx {
                api,
                entries: HashMap::new(),
            };
            (api.variant_dictionary_apply_f)(
                variant,
                visit,
                &mut ctx as *mut Ctx<'_> as *mut c_void,
            );
            Value::Dictionary(ctx.entries)
        }
        VARIANT_TYPE_NULL => Value::Null,
        other => {
            warn!(variant_type = other, "unknown variant type from daemon");
            Value::Null
        }
    }
}

/// Encode a request [`Value`] into a request object owned by the caller.
unsafe fn encode_request(api: &Api, value: &Value) -> ServiceResult<SkdObject> {
    match value {
        Value::Dictionary(entries) => {
            let dict = (api.request_dictionary_create)(ptr::null(), ptr::null(), 0);
            for (key, item) in entries {
                let result = encode_into_dictionary(api, dict, *key, item);
                if let Err(e) = result {
                    (api.request_release)(dict);
                    return Err(e);
                }
            }
            Ok(dict)
        }
        Value::Array(items) => {
            let array = (api.request_array_create)(ptr::null(), 0);
            for item in items {
                let result = encode_into_array(api, array, item);
                if let Err(e) = result {
                    (api.request_release)(array);
                    return Err(e);
                }
            }
            Ok(array)
        }
        other => Err(ServiceError::failed(format!(
            "request root must be a dictionary or array, got {other:?}"
        ))),
    }
}

unsafe fn encode_into_dictionary(
    api: &Api,
    dict: SkdObject,
    key: Uid,
    item: &Value,
) -> ServiceResult<()> {
    match item {
        Value::String(s) => {
            let cstr = CString::new(s.as_str())
                .map_err(|_| ServiceError::failed("request string contains NUL"))?;
            (api.request_dictionary_set_string)(dict, key.to_raw(), cstr.as_ptr());
        }
        Value::Int(i) => (api.request_dictionary_set_int64)(dict, key.to_raw(), *i),
        Value::Bool(b) => (api.request_dictionary_set_int64)(dict, key.to_raw(), *b as i64),
        Value::Uid(u) => (api.request_dictionary_set_uid)(dict, key.to_raw(), u.to_raw()),
        Value::Array(_) | Value::Dictionary(_) => {
            let child = encode_request(api, item)?;
            (api.request_dictionary_set_value)(dict, key.to_raw(), child);
            (api.request_release)(child);
        }
        Value::Null => {}
    }
    Ok(())
}

unsafe fn encode_into_array(api: &Api, array: SkdObject, item: &Value) -> ServiceResult<()> {
    match item {
        Value::String(s) => {
            let cstr = CString::new(s.as_str())
                .map_err(|_| ServiceError::failed("request string contains NUL"))?;
            (api.request_array_set_string)(array, ARRAY_APPEND, cstr.as_ptr());
        }
        Value::Array(_) | Value::Dictionary(_) => {
            let child = encode_request(api, item)?;
            (api.request_array_set_value)(array, ARRAY_APPEND, child);
            (api.request_release)(child);
        }
        other => {
            return Err(ServiceError::failed(format!(
                "unsupported request array element: {other:?}"
            )));
        }
    }
    Ok(())
}

/// Context handed to the C notification handler. Boxed and leaked for the
/// lifetime of the service, reclaimed on drop after unregistering.
struct NotificationCtx {
    api: Api,
    tx: broadcast::Sender<Notification>,
}

unsafe extern "C" fn notification_trampoline(response: SkdObject, ctx: *mut c_void) {
    let ctx = &*(ctx as *const NotificationCtx);
    if response.is_null() {
        let _ = ctx.tx.send(Notification::ConnectionInterrupted);
        return;
    }
    if (ctx.api.response_is_error)(response) {
        let kind = (ctx.api.response_error_get_kind)(response);
        if kind == ERROR_CONNECTION_INTERRUPTED {
            let _ = ctx.tx.send(Notification::ConnectionInterrupted);
        }
    } else {
        let value = decode_variant(&ctx.api, (ctx.api.response_get_value)(response));
        let _ = ctx.tx.send(Notification::Message(value));
    }
    (ctx.api.response_dispose)(response);
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<DylibService>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<DylibService>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Compiler-service connection over a loaded client library.
pub struct DylibService {
    /// Keeps the symbols in [`Api`] valid. Cloned into blocking tasks so an
    /// in-flight request can never outlive the mapping.
    lib: Arc<Library>,
    api: Api,
    vocabulary: Vocabulary,
    notifications: broadcast::Sender<Notification>,
    handler_ctx: *mut NotificationCtx,
    path: PathBuf,
}

// SAFETY: `handler_ctx` is only created in `open` and reclaimed in `drop`;
// between those points it is read exclusively by the C notification handler.
// All other fields are Send + Sync.
unsafe impl Send for DylibService {}
unsafe impl Sync for DylibService {}

impl DylibService {
    /// Open (or reuse) the connection for the client library at `path`.
    ///
    /// Connections are shared process-wide by canonical path.
    pub fn shared(path: &Path) -> ServiceResult<Arc<Self>> {
        let canonical = path
            .canonicalize()
            .map_err(|e| ServiceError::failed(format!("{}: {e}", path.display())))?;

        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = reg.get(&canonical).and_then(Weak::upgrade) {
            debug!(path = %canonical.display(), "reusing compiler-service connection");
            return Ok(existing);
        }
        let service = Arc::new(Self::open(&canonical)?);
        reg.insert(canonical, Arc::downgrade(&service));
        Ok(service)
    }

    fn open(path: &Path) -> ServiceResult<Self> {
        info!(path = %path.display(), "loading compiler-service client library");
        // SAFETY: loading a library runs its initializers; the path comes
        // from configuration and is trusted by the operator.
        let lib = unsafe { Library::new(path)? };
        let api = Api::load(&lib)?;

        // SAFETY: symbols resolved above; initialize is called once per load.
        unsafe { (api.initialize)() };

        // Vocabulary strings are static NUL-free constants.
        let vocabulary = Vocabulary::resolve(|s| match CString::new(s) {
            Ok(cstr) => Uid::from_raw(unsafe { (api.uid_get_from_cstr)(cstr.as_ptr()) }),
            Err(_) => Uid::from_raw(0),
        });

        let (tx, _) = broadcast::channel(64);
        let handler_ctx = Box::into_raw(Box::new(NotificationCtx {
            api,
            tx: tx.clone(),
        }));
        // SAFETY: handler_ctx stays valid until drop unregisters the handler.
        unsafe {
            (api.set_notification_handler_f)(
                Some(notification_trampoline),
                handler_ctx as *mut c_void,
            )
        };

        Ok(Self {
            lib: Arc::new(lib),
            api,
            vocabulary,
            notifications: tx,
            handler_ctx,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl CompilerService for DylibService {
    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    async fn send(&self, request: Value) -> ServiceResult<Value> {
        let api = self.api;
        let lib = Arc::clone(&self.lib);
        let reply = tokio::task::spawn_blocking(move || {
            // Holding the mapping open for the duration of the call; the
            // future may be dropped while this thread is still inside the
            // library.
            let _mapping = lib;
            // SAFETY: symbols belong to `_mapping`; request/response objects
            // are released on every path.
            unsafe {
                let req = encode_request(&api, &request)?;
                let response = (api.send_request_sync)(req);
                (api.request_release)(req);

                if response.is_null() {
                    return Err(ServiceError::ConnectionInterrupted);
                }
                let out = if (api.response_is_error)(response) {
                    let kind = (api.response_error_get_kind)(response);
                    let desc = (api.response_error_get_description)(response);
                    let desc = if desc.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr(desc).to_string_lossy().into_owned()
                    };
                    Err(match kind {
                        ERROR_CONNECTION_INTERRUPTED => ServiceError::ConnectionInterrupted,
                        ERROR_REQUEST_CANCELLED => ServiceError::Cancelled,
                        _ => ServiceError::Failed(desc),
                    })
                } else {
                    Ok(decode_variant(&api, (api.response_get_value)(response)))
                };
                (api.response_dispose)(response);
                out
            }
        })
        .await
        .map_err(|e| ServiceError::failed(format!("request task failed: {e}")))?;
        reply
    }

    fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

impl Drop for DylibService {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "closing compiler-service connection");
        // SAFETY: unregister before reclaiming the handler context; after
        // this call the library will not invoke the trampoline again.
        unsafe {
            (self.api.set_notification_handler_f)(None, ptr::null_mut());
            drop(Box::from_raw(self.handler_ctx));
            (self.api.shutdown)();
        }
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = reg.get(&self.path) {
            if entry.strong_count() == 0 {
                reg.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_rejects_missing_library() {
        let result = DylibService::shared(Path::new("/nonexistent/libsourcekitd.so"));
        assert!(result.is_err());
    }
}
