//! Owned zlib stream state
//!
//! The header codec needs two things `flate2` does not expose: deep copies of
//! a primed stream (`deflateCopy`/`inflateCopy`) and direct control over the
//! dictionary handshake. These wrappers own a heap-pinned `z_stream` each and
//! release it on drop.

use flate2::Compression;
use libz_sys as zlib;
use std::mem;
use std::os::raw::{c_int, c_uint};
use std::ptr;

/// A zlib call returned an unexpected status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed with zlib status {code}")]
pub struct StreamError {
    pub op: &'static str,
    pub code: c_int,
}

fn check(op: &'static str, code: c_int) -> Result<(), StreamError> {
    if code == zlib::Z_OK {
        Ok(())
    } else {
        Err(StreamError { op, code })
    }
}

unsafe extern "C" fn zalloc(_opaque: zlib::voidpf, items: zlib::uInt, size: zlib::uInt) -> zlib::voidpf {
    unsafe { libc::calloc(items as libc::size_t, size as libc::size_t) }
}

unsafe extern "C" fn zfree(_opaque: zlib::voidpf, address: zlib::voidpf) {
    unsafe { libc::free(address) }
}

// zlib keeps a back pointer to the z_stream inside its private state, so the
// struct is boxed and never moved once initialized.
fn blank_stream() -> Box<zlib::z_stream> {
    Box::new(zlib::z_stream {
        next_in: ptr::null_mut(),
        avail_in: 0,
        total_in: 0,
        next_out: ptr::null_mut(),
        avail_out: 0,
        total_out: 0,
        msg: ptr::null_mut(),
        state: ptr::null_mut(),
        zalloc,
        zfree,
        opaque: ptr::null_mut(),
        data_type: 0,
        adler: 0,
        reserved: 0,
    })
}

fn stream_size() -> c_int {
    mem::size_of::<zlib::z_stream>() as c_int
}

fn len_to_uint(len: usize) -> c_uint {
    assert!(len <= c_uint::MAX as usize, "buffer of {} bytes exceeds zlib limits", len);
    len as c_uint
}

/// Bytes moved by one streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub produced: usize,
}

/// Compression stream.
pub struct Deflater {
    raw: Box<zlib::z_stream>,
    initialized: bool,
}

// The stream state is exclusively owned and only touched through &mut self.
unsafe impl Send for Deflater {}

impl Deflater {
    pub fn new(level: Compression, window_bits: c_int, mem_level: c_int) -> Result<Self, StreamError> {
        let mut deflater = Deflater { raw: blank_stream(), initialized: false };
        let r = unsafe {
            zlib::deflateInit2_(
                &mut *deflater.raw,
                level.level() as c_int,
                zlib::Z_DEFLATED,
                window_bits,
                mem_level,
                zlib::Z_DEFAULT_STRATEGY,
                zlib::zlibVersion(),
                stream_size(),
            )
        };
        check("deflateInit2", r)?;
        deflater.initialized = true;
        Ok(deflater)
    }

    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<(), StreamError> {
        let r = unsafe {
            zlib::deflateSetDictionary(&mut *self.raw, dictionary.as_ptr(), len_to_uint(dictionary.len()))
        };
        check("deflateSetDictionary", r)
    }

    /// Deep copy of the stream, including any dictionary already primed.
    pub fn try_clone(&self) -> Result<Self, StreamError> {
        let mut copy = Deflater { raw: blank_stream(), initialized: false };
        // deflateCopy only reads from the source stream.
        let source = &*self.raw as *const zlib::z_stream as *mut zlib::z_stream;
        let r = unsafe { zlib::deflateCopy(&mut *copy.raw, source) };
        check("deflateCopy", r)?;
        copy.initialized = true;
        Ok(copy)
    }

    /// Worst-case compressed size of `len` input bytes.
    pub fn bound(&mut self, len: usize) -> usize {
        unsafe { zlib::deflateBound(&mut *self.raw, len as zlib::uLong) as usize }
    }

    /// One `deflate` call with `Z_SYNC_FLUSH`: all input is consumed and all
    /// output produced provided `output` holds [`Deflater::bound`] bytes.
    pub fn compress_sync(&mut self, input: &[u8], output: &mut [u8]) -> Result<Progress, StreamError> {
        let raw = &mut *self.raw;
        raw.next_in = input.as_ptr() as *mut u8;
        raw.avail_in = len_to_uint(input.len());
        raw.next_out = output.as_mut_ptr();
        raw.avail_out = len_to_uint(output.len());

        let r = unsafe { zlib::deflate(raw, zlib::Z_SYNC_FLUSH) };
        let progress = Progress {
            consumed: input.len() - raw.avail_in as usize,
            produced: output.len() - raw.avail_out as usize,
        };
        raw.next_in = ptr::null_mut();
        raw.avail_in = 0;
        raw.next_out = ptr::null_mut();
        raw.avail_out = 0;

        check("deflate", r)?;
        Ok(progress)
    }
}

impl Drop for Deflater {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                zlib::deflateEnd(&mut *self.raw);
            }
        }
    }
}

/// Outcome of one `inflate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    Ok,
    /// The zlib header named a preset dictionary that must be supplied
    /// before inflation can continue.
    NeedDictionary,
    StreamEnd,
    /// No progress was possible.
    BufError,
    Failed(c_int),
}

/// Decompression stream.
pub struct Inflater {
    raw: Box<zlib::z_stream>,
    initialized: bool,
}

unsafe impl Send for Inflater {}

impl Inflater {
    pub fn new() -> Result<Self, StreamError> {
        let mut inflater = Inflater { raw: blank_stream(), initialized: false };
        let r = unsafe { zlib::inflateInit_(&mut *inflater.raw, zlib::zlibVersion(), stream_size()) };
        check("inflateInit", r)?;
        inflater.initialized = true;
        Ok(inflater)
    }

    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<(), StreamError> {
        let r = unsafe {
            zlib::inflateSetDictionary(&mut *self.raw, dictionary.as_ptr(), len_to_uint(dictionary.len()))
        };
        check("inflateSetDictionary", r)
    }

    pub fn try_clone(&self) -> Result<Self, StreamError> {
        let mut copy = Inflater { raw: blank_stream(), initialized: false };
        // inflateCopy only reads from the source stream.
        let source = &*self.raw as *const zlib::z_stream as *mut zlib::z_stream;
        let r = unsafe { zlib::inflateCopy(&mut *copy.raw, source) };
        check("inflateCopy", r)?;
        copy.initialized = true;
        Ok(copy)
    }

    /// One streaming `inflate` call without flushing.
    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> (InflateStatus, Progress) {
        let raw = &mut *self.raw;
        raw.next_in = input.as_ptr() as *mut u8;
        raw.avail_in = len_to_uint(input.len());
        raw.next_out = output.as_mut_ptr();
        raw.avail_out = len_to_uint(output.len());

        let r = unsafe { zlib::inflate(raw, zlib::Z_NO_FLUSH) };
        let progress = Progress {
            consumed: input.len() - raw.avail_in as usize,
            produced: output.len() - raw.avail_out as usize,
        };
        raw.next_in = ptr::null_mut();
        raw.avail_in = 0;
        raw.next_out = ptr::null_mut();
        raw.avail_out = 0;

        let status = match r {
            zlib::Z_OK => InflateStatus::Ok,
            zlib::Z_NEED_DICT => InflateStatus::NeedDictionary,
            zlib::Z_STREAM_END => InflateStatus::StreamEnd,
            zlib::Z_BUF_ERROR => InflateStatus::BufError,
            code => InflateStatus::Failed(code),
        };
        (status, progress)
    }
}

impl Drop for Inflater {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                zlib::inflateEnd(&mut *self.raw);
            }
        }
    }
}
