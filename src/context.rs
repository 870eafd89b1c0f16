//! Per-thread compression context templates
//!
//! Priming a deflate stream with a SPDY dictionary is expensive compared to
//! copying an already-primed stream. Each thread keeps one primed
//! deflate/inflate pair per (version, level) and every codec instance starts
//! from a deep copy of it.

use crate::scratch::ScratchBuffer;
use crate::version::SpdyVersion;
use crate::zstream::{Deflater, Inflater};
use flate2::Compression;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::debug;

/// log2 of the deflate window when compression is disabled
const NO_COMPRESSION_WINDOW_BITS: i32 = 8;
/// log2 of the deflate window for compressed header blocks
const WINDOW_BITS: i32 = 11;
/// Internal deflate state memory level (1-9)
const MEM_LEVEL: i32 = 1;

/// Cache key of a context template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub version: SpdyVersion,
    pub level: u32,
}

/// Initialized, never-advanced stream pair used only as a clone source.
pub struct ContextTemplate {
    deflater: Deflater,
    inflater: Inflater,
}

impl ContextTemplate {
    /// Build a template for `version` at `level`.
    ///
    /// # Panics
    ///
    /// If zlib cannot initialize or prime the streams. Both depend only on
    /// static parameters, so failure means the process is broken.
    fn new(version: SpdyVersion, level: Compression) -> Self {
        let window_bits = if level == Compression::none() {
            NO_COMPRESSION_WINDOW_BITS
        } else {
            WINDOW_BITS
        };
        let mut deflater = Deflater::new(level, window_bits, MEM_LEVEL)
            .unwrap_or_else(|e| panic!("header deflater init: {}", e));
        if level != Compression::none() {
            deflater
                .set_dictionary(version.settings().dictionary)
                .unwrap_or_else(|e| panic!("header deflater dictionary: {}", e));
        }
        // The inflate dictionary can only be set once the stream header has
        // been read, so decode primes it on demand.
        let inflater = Inflater::new().unwrap_or_else(|e| panic!("header inflater init: {}", e));
        Self { deflater, inflater }
    }

    /// Independent copies of both streams.
    ///
    /// # Panics
    ///
    /// If zlib cannot allocate the copies.
    pub fn instantiate(&self) -> (Deflater, Inflater) {
        let deflater = self
            .deflater
            .try_clone()
            .unwrap_or_else(|e| panic!("header deflater copy: {}", e));
        let inflater = self
            .inflater
            .try_clone()
            .unwrap_or_else(|e| panic!("header inflater copy: {}", e));
        (deflater, inflater)
    }
}

/// Lazily populated template cache owned by one thread.
///
/// The registry is `!Sync`; it is handed to codec constructors
/// by `&mut` so no locking is ever needed.
#[derive(Default)]
pub struct ContextRegistry {
    templates: HashMap<ContextKey, ContextTemplate>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for `(version, level)`, creating it on first use.
    pub fn get(&mut self, version: SpdyVersion, level: Compression) -> &ContextTemplate {
        let key = ContextKey { version, level: level.level() };
        self.templates.entry(key).or_insert_with(|| {
            debug!("Creating header compression context for {} level {}", version, key.level);
            ContextTemplate::new(version, level)
        })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn contains(&self, version: SpdyVersion, level: Compression) -> bool {
        self.templates.contains_key(&ContextKey { version, level: level.level() })
    }
}

/// Everything a thread needs to run header codecs: the template registry and
/// the scratch buffer shared by all codecs on the thread.
#[derive(Default)]
pub struct CodecContext {
    pub registry: ContextRegistry,
    pub scratch: ScratchBuffer,
}

thread_local! {
    static CURRENT: RefCell<CodecContext> = RefCell::new(CodecContext::default());
}

impl CodecContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the calling thread's context, created on first use and
    /// dropped when the thread exits.
    ///
    /// # Panics
    ///
    /// If called re-entrantly from within `f`.
    pub fn with_current<R>(f: impl FnOnce(&mut CodecContext) -> R) -> R {
        CURRENT.with(|ctx| f(&mut ctx.borrow_mut()))
    }
}
