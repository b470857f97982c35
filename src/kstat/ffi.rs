//! libkstat backend (illumos/Solaris only).
//!
//! Thin binding over `kstat_open`/`kstat_chain_update`/`kstat_read` that
//! exposes the chain through the [`StatChain`] trait. The chain holds raw
//! pointers into libkstat's arena; a chain update frees and reallocates
//! records, so the backend keeps an id -> pointer index that is rebuilt on
//! every successful sync and hands out only the stable kstat ids upwards.
//! The raw `unix:0:sysinfo` / `unix:0:vminfo` providers are decoded into
//! named values here so every consumer sees one uniform interface.

use std::ffi::CStr;
use std::io;
use std::os::raw::{c_char, c_int, c_uchar, c_uint, c_void};
use std::ptr;

use ahash::AHashMap;

use super::source::{ChainError, Generation, RecordId, RecordInfo, Sample, StatChain, Value};

const KSTAT_STRLEN: usize = 31;

const KSTAT_TYPE_RAW: c_uchar = 0;
const KSTAT_TYPE_NAMED: c_uchar = 1;

const KSTAT_DATA_CHAR: c_uchar = 0;
const KSTAT_DATA_INT32: c_uchar = 1;
const KSTAT_DATA_UINT32: c_uchar = 2;
const KSTAT_DATA_INT64: c_uchar = 3;
const KSTAT_DATA_UINT64: c_uchar = 4;
const KSTAT_DATA_STRING: c_uchar = 9;

#[allow(non_camel_case_types)]
type kid_t = c_int;
#[allow(non_camel_case_types)]
type hrtime_t = i64;

#[repr(C)]
struct kstat_t {
    ks_crtime: hrtime_t,
    ks_next: *mut kstat_t,
    ks_kid: kid_t,
    ks_module: [c_char; KSTAT_STRLEN],
    ks_resv: c_uchar,
    ks_instance: c_int,
    ks_name: [c_char; KSTAT_STRLEN],
    ks_type: c_uchar,
    ks_class: [c_char; KSTAT_STRLEN],
    ks_flags: c_uchar,
    ks_data: *mut c_void,
    ks_ndata: c_uint,
    ks_data_size: usize,
    ks_snaptime: hrtime_t,
    ks_update: *mut c_void,
    ks_private: *mut c_void,
    ks_snapshot: *mut c_void,
    ks_lock: *mut c_void,
}

#[repr(C)]
struct kstat_ctl_t {
    kc_chain_id: kid_t,
    kc_chain: *mut kstat_t,
    kc_kd: c_int,
}

#[repr(C)]
struct kstat_str_t {
    addr: *mut c_char,
    len: u32,
}

#[repr(C)]
union kstat_value_t {
    c: [c_char; 16],
    i32_: i32,
    ui32: u32,
    i64_: i64,
    ui64: u64,
    str_: std::mem::ManuallyDrop<kstat_str_t>,
}

#[repr(C)]
struct kstat_named_t {
    name: [c_char; KSTAT_STRLEN],
    data_type: c_uchar,
    value: kstat_value_t,
}

/// Cumulative scheduler queue counters, one tick per kernel update.
#[repr(C)]
#[derive(Clone, Copy)]
struct sysinfo_t {
    updates: c_uint,
    runque: c_uint,
    runocc: c_uint,
    swpque: c_uint,
    swpocc: c_uint,
    waiting: c_uint,
}

/// Cumulative memory/swap page counters, one tick per kernel update.
#[repr(C)]
#[derive(Clone, Copy)]
struct vminfo_t {
    freemem: u64,
    swap_resv: u64,
    swap_alloc: u64,
    swap_avail: u64,
    swap_free: u64,
    updates: u64,
}

#[link(name = "kstat")]
extern "C" {
    fn kstat_open() -> *mut kstat_ctl_t;
    fn kstat_close(kc: *mut kstat_ctl_t) -> c_int;
    fn kstat_chain_update(kc: *mut kstat_ctl_t) -> kid_t;
    fn kstat_read(kc: *mut kstat_ctl_t, ksp: *mut kstat_t, buf: *mut c_void) -> kid_t;
}

extern "C" {
    fn gethrtime() -> hrtime_t;
}

pub fn hrtime_now() -> i64 {
    unsafe { gethrtime() }
}

fn fixed_str(buf: &[c_char; KSTAT_STRLEN]) -> String {
    let bytes: &[u8] = unsafe { &*(buf as *const [c_char; KSTAT_STRLEN] as *const [u8; KSTAT_STRLEN]) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(KSTAT_STRLEN);
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn last_errno() -> ChainError {
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EAGAIN) {
        ChainError::Busy
    } else {
        ChainError::Unavailable(err.to_string())
    }
}

/// The process-wide libkstat chain. Not internally synchronized: a chain
/// update frees records a concurrent reader could still reference, so all
/// access must stay behind the scrape-level lock.
pub struct KernelChain {
    kc: *mut kstat_ctl_t,
    index: AHashMap<RecordId, *mut kstat_t>,
}

// The raw pointers confine the chain to one thread at a time; the scrape
// mutex in the application state is that confinement.
unsafe impl Send for KernelChain {}

impl KernelChain {
    pub fn new() -> Self {
        Self {
            kc: ptr::null_mut(),
            index: AHashMap::new(),
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let mut ksp = unsafe { (*self.kc).kc_chain };
        while !ksp.is_null() {
            let kid = unsafe { (*ksp).ks_kid };
            self.index.insert(kid as u32 as u64, ksp);
            ksp = unsafe { (*ksp).ks_next };
        }
    }

    fn decode_named(ksp: *mut kstat_t) -> Sample {
        let mut sample = Sample::new(unsafe { (*ksp).ks_snaptime });
        let ndata = unsafe { (*ksp).ks_ndata } as usize;
        let data = unsafe { (*ksp).ks_data } as *const kstat_named_t;
        if data.is_null() {
            return sample;
        }
        for i in 0..ndata {
            let knp = unsafe { &*data.add(i) };
            let name = fixed_str(&knp.name);
            let value = unsafe {
                match knp.data_type {
                    KSTAT_DATA_INT32 => Value::I32(knp.value.i32_),
                    KSTAT_DATA_UINT32 => Value::U32(knp.value.ui32),
                    KSTAT_DATA_INT64 => Value::I64(knp.value.i64_),
                    KSTAT_DATA_UINT64 => Value::U64(knp.value.ui64),
                    KSTAT_DATA_CHAR => {
                        let bytes = &*(knp.value.c.as_ptr() as *const [u8; 16]);
                        let len = bytes.iter().position(|&b| b == 0).unwrap_or(16);
                        Value::Str(String::from_utf8_lossy(&bytes[..len]).into_owned())
                    }
                    KSTAT_DATA_STRING => {
                        let s = &knp.value.str_;
                        if s.addr.is_null() {
                            Value::Str(String::new())
                        } else {
                            Value::Str(CStr::from_ptr(s.addr).to_string_lossy().into_owned())
                        }
                    }
                    _ => continue,
                }
            };
            sample.put(name, value);
        }
        sample
    }

    fn decode_raw(ksp: *mut kstat_t) -> Result<Sample, ChainError> {
        let module = fixed_str(unsafe { &(*ksp).ks_module });
        let name = fixed_str(unsafe { &(*ksp).ks_name });
        let data = unsafe { (*ksp).ks_data };
        let size = unsafe { (*ksp).ks_data_size };
        let mut sample = Sample::new(unsafe { (*ksp).ks_snaptime });
        if module == "unix" && name == "sysinfo" && size >= std::mem::size_of::<sysinfo_t>() {
            let si = unsafe { *(data as *const sysinfo_t) };
            sample.put("updates", Value::U32(si.updates));
            sample.put("runque", Value::U32(si.runque));
            sample.put("runocc", Value::U32(si.runocc));
            sample.put("swpque", Value::U32(si.swpque));
            sample.put("swpocc", Value::U32(si.swpocc));
            sample.put("waiting", Value::U32(si.waiting));
            return Ok(sample);
        }
        if module == "unix" && name == "vminfo" && size >= std::mem::size_of::<vminfo_t>() {
            let vi = unsafe { *(data as *const vminfo_t) };
            sample.put("freemem", Value::U64(vi.freemem));
            sample.put("swap_resv", Value::U64(vi.swap_resv));
            sample.put("swap_alloc", Value::U64(vi.swap_alloc));
            sample.put("swap_avail", Value::U64(vi.swap_avail));
            sample.put("swap_free", Value::U64(vi.swap_free));
            sample.put("updates", Value::U64(vi.updates));
            return Ok(sample);
        }
        Err(ChainError::Unavailable(format!(
            "raw kstat {module}:{name} has no decoder"
        )))
    }
}

impl Drop for KernelChain {
    fn drop(&mut self) {
        if !self.kc.is_null() {
            unsafe { kstat_close(self.kc) };
            self.kc = ptr::null_mut();
        }
    }
}

impl StatChain for KernelChain {
    fn sync(&mut self) -> Result<(), ChainError> {
        if self.kc.is_null() {
            let kc = unsafe { kstat_open() };
            if kc.is_null() {
                return Err(last_errno());
            }
            self.kc = kc;
        } else if unsafe { kstat_chain_update(self.kc) } == -1 {
            return Err(last_errno());
        }
        self.rebuild_index();
        Ok(())
    }

    fn generation(&self) -> Generation {
        if self.kc.is_null() {
            0
        } else {
            unsafe { (*self.kc).kc_chain_id as u32 as u64 }
        }
    }

    fn walk(&self, visit: &mut dyn FnMut(&RecordInfo) -> bool) {
        if self.kc.is_null() {
            return;
        }
        let mut ksp = unsafe { (*self.kc).kc_chain };
        while !ksp.is_null() {
            let info = unsafe {
                RecordInfo {
                    id: (*ksp).ks_kid as u32 as u64,
                    module: fixed_str(&(*ksp).ks_module),
                    instance: (*ksp).ks_instance,
                    name: fixed_str(&(*ksp).ks_name),
                }
            };
            if !visit(&info) {
                break;
            }
            ksp = unsafe { (*ksp).ks_next };
        }
    }

    fn read(&mut self, id: RecordId) -> Result<Sample, ChainError> {
        let &ksp = self.index.get(&id).ok_or(ChainError::NotFound)?;
        if unsafe { kstat_read(self.kc, ksp, ptr::null_mut()) } == -1 {
            return Err(last_errno());
        }
        match unsafe { (*ksp).ks_type } {
            KSTAT_TYPE_NAMED => Ok(Self::decode_named(ksp)),
            KSTAT_TYPE_RAW => Self::decode_raw(ksp),
            other => Err(ChainError::Unavailable(format!(
                "unsupported kstat type {other}"
            ))),
        }
    }
}
