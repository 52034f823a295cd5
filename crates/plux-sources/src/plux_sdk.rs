//! Vendor plux SDK binding
//!
//! The vendor library is C++, so it is reached through a thin C-ABI shim
//! loaded at runtime from the path in `PLUX_SDK_LIB`. The shim exports the
//! functions named in [`symbols`]:
//!
//! - `plux_api_version() -> u32`
//! - `plux_open(address, err, err_len) -> *mut c_void` (null on failure)
//! - `plux_start(dev, frequency, sources, n_sources, err, err_len) -> c_int`
//! - `plux_loop(dev, callback, ctx, err, err_len) -> c_int`
//! - `plux_stop(dev, err, err_len) -> c_int`
//! - `plux_close(dev)`
//! - `plux_battery(dev, level, err, err_len) -> c_int`
//! - `plux_properties(dev, buf, buf_len, err, err_len) -> c_int`
//!
//! Functions returning `c_int` return 0 on success and otherwise write a
//! NUL-terminated message into the caller's error buffer. Properties come
//! back as `key=value` lines. `plux_loop` calls `callback` for every raw
//! frame until it returns `true`.

use crate::device::{
    AcquisitionConfig, ChannelSource, DeviceConnector, DeviceHandle, DeviceQuery, FrameSink,
};
use libloading::Library;
use plux_core::{PluxError, PluxResult};
use std::collections::BTreeMap;
use std::ffi::{c_char, c_int, c_void, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Environment variable naming the SDK shim library
pub const SDK_LIB_ENV: &str = "PLUX_SDK_LIB";

/// ABI version the shim must report
pub const SDK_API_VERSION: u32 = 1;

const ERROR_BUF_LEN: usize = 256;
const PROPERTIES_BUF_LEN: usize = 4096;

/// Exported symbol names (NUL-terminated)
pub mod symbols {
    pub const API_VERSION: &[u8] = b"plux_api_version\0";
    pub const OPEN: &[u8] = b"plux_open\0";
    pub const START: &[u8] = b"plux_start\0";
    pub const LOOP: &[u8] = b"plux_loop\0";
    pub const STOP: &[u8] = b"plux_stop\0";
    pub const CLOSE: &[u8] = b"plux_close\0";
    pub const BATTERY: &[u8] = b"plux_battery\0";
    pub const PROPERTIES: &[u8] = b"plux_properties\0";
}

/// `ChannelSource` as laid out for the shim
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSource {
    pub port: c_int,
    pub freq_divisor: c_int,
    pub n_bits: c_int,
    pub ch_mask: c_int,
}

impl From<&ChannelSource> for RawSource {
    fn from(source: &ChannelSource) -> Self {
        Self {
            port: c_int::from(source.port),
            freq_divisor: c_int::try_from(source.freq_divisor).unwrap_or(c_int::MAX),
            n_bits: c_int::from(source.n_bits),
            ch_mask: c_int::from(source.ch_mask),
        }
    }
}

type FrameCallback =
    unsafe extern "C" fn(ctx: *mut c_void, seq: c_int, data: *const c_int, len: usize) -> bool;

type ApiVersionFn = unsafe extern "C" fn() -> u32;
type OpenFn =
    unsafe extern "C" fn(address: *const c_char, err: *mut c_char, err_len: usize) -> *mut c_void;
type StartFn = unsafe extern "C" fn(
    dev: *mut c_void,
    frequency: f32,
    sources: *const RawSource,
    n_sources: usize,
    err: *mut c_char,
    err_len: usize,
) -> c_int;
type LoopFn = unsafe extern "C" fn(
    dev: *mut c_void,
    callback: FrameCallback,
    ctx: *mut c_void,
    err: *mut c_char,
    err_len: usize,
) -> c_int;
type StopFn = unsafe extern "C" fn(dev: *mut c_void, err: *mut c_char, err_len: usize) -> c_int;
type CloseFn = unsafe extern "C" fn(dev: *mut c_void);
type BatteryFn = unsafe extern "C" fn(
    dev: *mut c_void,
    level: *mut f32,
    err: *mut c_char,
    err_len: usize,
) -> c_int;
type PropertiesFn = unsafe extern "C" fn(
    dev: *mut c_void,
    buf: *mut c_char,
    buf_len: usize,
    err: *mut c_char,
    err_len: usize,
) -> c_int;

/// Resolved shim entry points
///
/// The function pointers are only valid while `_lib` is loaded, so the
/// table is shared behind an `Arc` by the connector and every open device.
struct PluxApi {
    path: PathBuf,
    open: OpenFn,
    start: StartFn,
    run_loop: LoopFn,
    stop: StopFn,
    close: CloseFn,
    battery: BatteryFn,
    properties: PropertiesFn,
    _lib: Library,
}

impl PluxApi {
    fn load(path: &Path) -> PluxResult<Self> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| PluxError::device(path.display().to_string(), e.to_string()))?;

        let version: ApiVersionFn = unsafe { symbol(&lib, symbols::API_VERSION, path)? };
        let reported = unsafe { version() };
        if reported != SDK_API_VERSION {
            return Err(PluxError::device(
                path.display().to_string(),
                format!(
                    "SDK shim reports ABI version {}, expected {}",
                    reported, SDK_API_VERSION
                ),
            ));
        }

        unsafe {
            Ok(Self {
                path: path.to_path_buf(),
                open: symbol(&lib, symbols::OPEN, path)?,
                start: symbol(&lib, symbols::START, path)?,
                run_loop: symbol(&lib, symbols::LOOP, path)?,
                stop: symbol(&lib, symbols::STOP, path)?,
                close: symbol(&lib, symbols::CLOSE, path)?,
                battery: symbol(&lib, symbols::BATTERY, path)?,
                properties: symbol(&lib, symbols::PROPERTIES, path)?,
                _lib: lib,
            })
        }
    }
}

/// Look up one exported function
///
/// # Safety
/// `T` must match the exported function's signature.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8], path: &Path) -> PluxResult<T> {
    lib.get::<T>(name).map(|s| *s).map_err(|e| {
        let name = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned();
        PluxError::device(
            path.display().to_string(),
            format!("missing symbol {}: {}", name, e),
        )
    })
}

/// Caller-owned buffer the shim writes error messages into
struct ErrorBuf([c_char; ERROR_BUF_LEN]);

impl ErrorBuf {
    fn new() -> Self {
        Self([0; ERROR_BUF_LEN])
    }

    fn as_mut_ptr(&mut self) -> *mut c_char {
        self.0.as_mut_ptr()
    }

    fn capacity(&self) -> usize {
        self.0.len()
    }

    fn message(&self) -> String {
        let text = c_text(&self.0);
        if text.is_empty() {
            "unknown plux SDK error".to_string()
        } else {
            text
        }
    }
}

/// Text up to the first NUL, or the whole buffer if unterminated
fn c_text(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn check(address: &str, op: &str, code: c_int, err: &ErrorBuf) -> PluxResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(PluxError::device(
            address,
            format!("{} failed ({}): {}", op, code, err.message()),
        ))
    }
}

/// Parse `key=value` lines returned by `plux_properties`
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Queries against an open device, usable from inside the frame callback
struct SdkQuery<'a> {
    api: &'a PluxApi,
    raw: *mut c_void,
    address: &'a str,
}

impl DeviceQuery for SdkQuery<'_> {
    fn battery(&mut self) -> PluxResult<f32> {
        let mut level = 0.0f32;
        let mut err = ErrorBuf::new();
        let code = unsafe {
            (self.api.battery)(self.raw, &mut level, err.as_mut_ptr(), err.capacity())
        };
        check(self.address, "getBattery", code, &err)?;
        Ok(level)
    }

    fn properties(&mut self) -> PluxResult<BTreeMap<String, String>> {
        let mut buf: Vec<c_char> = vec![0; PROPERTIES_BUF_LEN];
        let mut err = ErrorBuf::new();
        let code = unsafe {
            (self.api.properties)(
                self.raw,
                buf.as_mut_ptr(),
                buf.len(),
                err.as_mut_ptr(),
                err.capacity(),
            )
        };
        check(self.address, "getProperties", code, &err)?;
        Ok(parse_properties(&c_text(&buf)))
    }
}

/// State handed to the shim as the callback context of `plux_loop`
struct LoopContext<'a> {
    sink: &'a mut dyn FrameSink,
    query: &'a mut dyn DeviceQuery,
    panicked: bool,
}

/// Frame callback passed to `plux_loop`
///
/// # Safety
/// `ctx` must point to a live `LoopContext` and `data` to `len` values.
unsafe extern "C" fn on_raw_frame(
    ctx: *mut c_void,
    seq: c_int,
    data: *const c_int,
    len: usize,
) -> bool {
    let ctx = &mut *(ctx as *mut LoopContext<'_>);
    let frame: &[i32] = if data.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    };
    let seq = u64::try_from(seq).unwrap_or_default();

    // Unwinding across the C boundary is undefined
    match catch_unwind(AssertUnwindSafe(|| {
        ctx.sink.on_frame(seq, frame, &mut *ctx.query)
    })) {
        Ok(done) => done,
        Err(_) => {
            ctx.panicked = true;
            true
        }
    }
}

/// Device opened through the SDK shim
pub struct PluxSdkDevice {
    api: Arc<PluxApi>,
    raw: *mut c_void,
    address: String,
}

// The SDK handle is only used through `&mut self`, one thread at a time.
unsafe impl Send for PluxSdkDevice {}

impl PluxSdkDevice {
    fn query(&self) -> PluxResult<SdkQuery<'_>> {
        if self.raw.is_null() {
            return Err(PluxError::device(&self.address, "device is closed"));
        }
        Ok(SdkQuery {
            api: &self.api,
            raw: self.raw,
            address: &self.address,
        })
    }
}

impl DeviceQuery for PluxSdkDevice {
    fn battery(&mut self) -> PluxResult<f32> {
        self.query()?.battery()
    }

    fn properties(&mut self) -> PluxResult<BTreeMap<String, String>> {
        self.query()?.properties()
    }
}

impl DeviceHandle for PluxSdkDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn start(&mut self, config: &AcquisitionConfig) -> PluxResult<()> {
        let query = self.query()?;
        let sources: Vec<RawSource> = config.sources.iter().map(RawSource::from).collect();
        let mut err = ErrorBuf::new();
        let code = unsafe {
            (self.api.start)(
                query.raw,
                config.frequency as f32,
                sources.as_ptr(),
                sources.len(),
                err.as_mut_ptr(),
                err.capacity(),
            )
        };
        check(&self.address, "start", code, &err)?;
        debug!(address = %self.address, frequency = config.frequency, sources = sources.len(), "acquisition started");
        Ok(())
    }

    fn run_loop(&mut self, sink: &mut dyn FrameSink) -> PluxResult<()> {
        let mut query = self.query()?;
        let raw = query.raw;
        let run_loop = self.api.run_loop;
        let mut context = LoopContext {
            sink,
            query: &mut query,
            panicked: false,
        };
        let mut err = ErrorBuf::new();
        let code = unsafe {
            run_loop(
                raw,
                on_raw_frame,
                &mut context as *mut LoopContext<'_> as *mut c_void,
                err.as_mut_ptr(),
                err.capacity(),
            )
        };
        if context.panicked {
            error!(address = %self.address, "frame handler panicked, device loop stopped");
            return Err(PluxError::device(&self.address, "frame handler panicked"));
        }
        check(&self.address, "loop", code, &err)
    }

    fn stop(&mut self) -> PluxResult<()> {
        let query = self.query()?;
        let mut err = ErrorBuf::new();
        let code = unsafe { (self.api.stop)(query.raw, err.as_mut_ptr(), err.capacity()) };
        check(&self.address, "stop", code, &err)
    }

    fn close(&mut self) -> PluxResult<()> {
        if !self.raw.is_null() {
            unsafe { (self.api.close)(self.raw) };
            self.raw = std::ptr::null_mut();
            debug!(address = %self.address, "device closed");
        }
        Ok(())
    }
}

impl Drop for PluxSdkDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Connector opening hardware addresses through the vendor SDK shim
#[derive(Clone)]
pub struct PluxSdkConnector {
    api: Arc<PluxApi>,
}

impl PluxSdkConnector {
    pub fn load(path: impl AsRef<Path>) -> PluxResult<Self> {
        let api = PluxApi::load(path.as_ref())?;
        info!(path = %api.path.display(), "plux SDK loaded");
        Ok(Self { api: Arc::new(api) })
    }

    /// Load the library named by `PLUX_SDK_LIB`
    pub fn from_env() -> PluxResult<Self> {
        let path = std::env::var_os(SDK_LIB_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| plux_core::config_error!("{} is not set", SDK_LIB_ENV))?;
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.api.path
    }
}

impl std::fmt::Debug for PluxSdkConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluxSdkConnector")
            .field("path", &self.api.path)
            .finish()
    }
}

impl DeviceConnector for PluxSdkConnector {
    fn open(&self, address: &str) -> PluxResult<Box<dyn DeviceHandle>> {
        let c_address = CString::new(address)
            .map_err(|_| PluxError::device(address, "address contains a NUL byte"))?;
        let mut err = ErrorBuf::new();
        let raw = unsafe { (self.api.open)(c_address.as_ptr(), err.as_mut_ptr(), err.capacity()) };
        if raw.is_null() {
            return Err(PluxError::device(
                address,
                format!("open failed: {}", err.message()),
            ));
        }
        info!(address, "plux device opened");
        Ok(Box::new(PluxSdkDevice {
            api: Arc::clone(&self.api),
            raw,
            address: address.to_string(),
        }))
    }
}
