//! Binding an in-process component with combind
//!
//! Implements a small counter component by hand (a `#[repr(C)]` object with
//! a function table), describes its interface with `#[com_interface]`, and
//! drives it by name through the synthesized binding.
//!
//! Set `COMBIND_LOG=trace` to see reference counting and native calls.

use std::ffi::c_void;
use std::process::ExitCode;
use std::sync::atomic::{AtomicI32, Ordering};

use combind::hresult::{E_NOINTERFACE, E_POINTER, S_OK};
use combind::interfaces::{IID_IUNKNOWN, IUnknownVtbl};
use combind::proc::com_interface;
use combind::{
    BindingConfig, ComInterface, ComRefCount, Guid, HRESULT, InterfacePointer, Object, Result,
    args, bstr, create_default, install_config, register_default_implementation, shutdown,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Interface
// =============================================================================

#[com_interface("6d5f4b0e-9a51-4e5a-a3c4-1b2f0d6e7a10")]
pub trait ICounter {
    #[propget]
    fn Value(&self, #[out] #[retval] value: *mut i32) -> HRESULT;
    #[propput]
    fn Value(&self, value: i32) -> HRESULT;
    /// Add `step` and return the new value
    fn Add(&self, #[default(1)] step: i32, #[out] #[retval] total: *mut i32) -> HRESULT;
    #[propget]
    fn Name(&self, #[out] #[retval] name: *mut BSTR) -> HRESULT;
}

// =============================================================================
// Component
// =============================================================================

#[repr(C)]
struct CounterVtbl {
    base: IUnknownVtbl,
    get_value: unsafe extern "system" fn(*mut c_void, *mut i32) -> HRESULT,
    put_value: unsafe extern "system" fn(*mut c_void, i32) -> HRESULT,
    add: unsafe extern "system" fn(*mut c_void, i32, *mut i32) -> HRESULT,
    get_name: unsafe extern "system" fn(*mut c_void, *mut *mut u16) -> HRESULT,
}

#[repr(C)]
struct Counter {
    vtbl: &'static CounterVtbl,
    refs: ComRefCount,
    value: AtomicI32,
}

static COUNTER_VTBL: CounterVtbl = CounterVtbl {
    base: IUnknownVtbl {
        query_interface: Counter::query_interface,
        add_ref: Counter::add_ref,
        release: Counter::release,
    },
    get_value: Counter::get_value,
    put_value: Counter::put_value,
    add: Counter::add,
    get_name: Counter::get_name,
};

impl Counter {
    /// A new counter; the returned pointer owns the creator's reference.
    fn create() -> InterfacePointer {
        let raw = Box::into_raw(Box::new(Counter {
            vtbl: &COUNTER_VTBL,
            refs: ComRefCount::new(),
            value: AtomicI32::new(0),
        }));
        unsafe { InterfacePointer::from_raw(raw.cast(), IID_IUNKNOWN) }
    }

    unsafe fn this<'a>(this: *mut c_void) -> &'a Counter {
        unsafe { &*(this as *const Counter) }
    }

    unsafe extern "system" fn query_interface(
        this: *mut c_void,
        riid: *const Guid,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if riid.is_null() || ppv.is_null() {
            return E_POINTER;
        }
        unsafe {
            let iid = *riid;
            if iid == IID_IUNKNOWN || iid == ICounter::IID {
                Self::add_ref(this);
                *ppv = this;
                S_OK
            } else {
                *ppv = std::ptr::null_mut();
                E_NOINTERFACE
            }
        }
    }

    unsafe extern "system" fn add_ref(this: *mut c_void) -> u32 {
        unsafe { Self::this(this) }.refs.add_ref()
    }

    unsafe extern "system" fn release(this: *mut c_void) -> u32 {
        let remaining = unsafe { Self::this(this) }.refs.release();
        if remaining == 0 {
            info!("counter destroyed");
            drop(unsafe { Box::from_raw(this as *mut Counter) });
        }
        remaining
    }

    unsafe extern "system" fn get_value(this: *mut c_void, out: *mut i32) -> HRESULT {
        if out.is_null() {
            return E_POINTER;
        }
        unsafe { *out = Self::this(this).value.load(Ordering::SeqCst) };
        S_OK
    }

    unsafe extern "system" fn put_value(this: *mut c_void, value: i32) -> HRESULT {
        unsafe { Self::this(this) }.value.store(value, Ordering::SeqCst);
        S_OK
    }

    unsafe extern "system" fn add(this: *mut c_void, step: i32, total: *mut i32) -> HRESULT {
        if total.is_null() {
            return E_POINTER;
        }
        let counter = unsafe { Self::this(this) };
        let new = counter.value.fetch_add(step, Ordering::SeqCst) + step;
        unsafe { *total = new };
        S_OK
    }

    unsafe extern "system" fn get_name(_this: *mut c_void, out: *mut *mut u16) -> HRESULT {
        if out.is_null() {
            return E_POINTER;
        }
        unsafe { *out = bstr::alloc("demo counter") };
        S_OK
    }
}

// =============================================================================
// Driver
// =============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_env("COMBIND_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    register_default_implementation(ICounter::IID, || ICounter::bind(&Counter::create()));

    let counter: Object = create_default(&ICounter::IID)?;
    println!("bound {counter:?}");
    println!("name  = {}", counter.get("Name")?);

    counter.set("Value", 10)?;
    println!("value = {}", counter.get("Value")?);
    println!("Add(5) -> {}", counter.call("Add", args![5])?);
    println!("Add()  -> {}", counter.call("Add", ())?);
    println!("Add(step: 4) -> {}", counter.call("Add", args![; step = 4])?);

    match counter.call("Add", args!["five"]) {
        Ok(v) => println!("unexpected success: {v}"),
        Err(e) => println!("Add(\"five\") failed: {e}"),
    }
    match counter.call("Reset", ()) {
        Ok(v) => println!("unexpected success: {v}"),
        Err(e) => println!("Reset() failed: {e}"),
    }

    let members: Vec<&str> = counter.interface().member_names().collect();
    println!("members: {}", members.join(", "));
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    install_config(BindingConfig::builder().trace_calls(true).build());

    let result = run();
    shutdown();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
