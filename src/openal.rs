// OpenAL binding loaded at runtime, so the decoder and scheduler build
// and test on machines without the library installed.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use libloading::{Error, Library, Symbol};
use thiserror::Error as ThisError;
use tracing::{debug, trace};

use crate::midi::player::AudioSink;
use crate::synth::SAMPLE_RATE;

/// 16-bit mono buffer format.
const AL_FORMAT_MONO16: c_int = 0x1101;
/// `alSourcei` parameter selecting the source's buffer.
const AL_BUFFER: c_int = 0x1009;
const AL_NO_ERROR: c_int = 0;

/// Errors from the OpenAL backend.
#[derive(Debug, Clone, ThisError)]
pub enum AudioError {
    #[error("OpenAL library not available: {0}")]
    LibraryUnavailable(String),
    #[error("OpenAL is missing symbol `{0}`")]
    MissingSymbol(&'static str),
    #[error("an OpenAL device is already open")]
    DeviceBusy,
    #[error("failed to open the default OpenAL device")]
    DeviceOpen,
    #[error("failed to create an OpenAL context")]
    ContextCreate,
    #[error("OpenAL reported error {code:#x} during {during}")]
    Call { code: c_int, during: &'static str },
}

/// The dynamic bindings for OpenAL.
struct AlBinds {
    alc_open_device: Symbol<'static, unsafe extern "C" fn(*const c_char) -> *mut c_void>,
    alc_create_context: Symbol<'static, unsafe extern "C" fn(*mut c_void, *const c_int) -> *mut c_void>,
    alc_make_context_current: Symbol<'static, unsafe extern "C" fn(*mut c_void) -> c_char>,
    alc_destroy_context: Symbol<'static, unsafe extern "C" fn(*mut c_void)>,
    alc_close_device: Symbol<'static, unsafe extern "C" fn(*mut c_void) -> c_char>,
    al_get_error: Symbol<'static, unsafe extern "C" fn() -> c_int>,
    al_gen_buffers: Symbol<'static, unsafe extern "C" fn(c_int, *mut u32)>,
    al_delete_buffers: Symbol<'static, unsafe extern "C" fn(c_int, *const u32)>,
    al_buffer_data: Symbol<'static, unsafe extern "C" fn(u32, c_int, *const c_void, c_int, c_int)>,
    al_gen_sources: Symbol<'static, unsafe extern "C" fn(c_int, *mut u32)>,
    al_delete_sources: Symbol<'static, unsafe extern "C" fn(c_int, *const u32)>,
    al_sourcei: Symbol<'static, unsafe extern "C" fn(u32, c_int, c_int)>,
    al_source_play: Symbol<'static, unsafe extern "C" fn(u32)>,
    al_source_stop: Symbol<'static, unsafe extern "C" fn(u32)>,

    is_device_open: AtomicBool,
}

impl AlBinds {
    /// Opens the default output device and a context made current on it.
    ///
    /// Errors if a device opened through here is still alive; the sink
    /// tears everything down when dropped.
    fn open_device(&'static self) -> Result<OpenAlSink, AudioError> {
        if self.is_device_open.swap(true, Ordering::Acquire) {
            return Err(AudioError::DeviceBusy);
        }

        let device = unsafe { (self.alc_open_device)(ptr::null()) };
        if device.is_null() {
            self.is_device_open.store(false, Ordering::Release);
            return Err(AudioError::DeviceOpen);
        }

        let context = unsafe { (self.alc_create_context)(device, ptr::null()) };
        if context.is_null() {
            unsafe {
                (self.alc_close_device)(device);
            }
            self.is_device_open.store(false, Ordering::Release);
            return Err(AudioError::ContextCreate);
        }

        unsafe {
            (self.alc_make_context_current)(context);
            // Clear any stale error state before the first voice.
            (self.al_get_error)();
        }
        debug!("opened OpenAL device");
        Ok(OpenAlSink {
            binds: self,
            device,
            context,
        })
    }
}

fn load_openal_lib() -> Result<Library, Error> {
    unsafe {
        #[cfg(target_os = "windows")]
        {
            let lib = Library::new("OpenAL32.dll");
            if lib.is_ok() {
                return lib;
            }
            return Library::new("soft_oal.dll");
        }
        #[cfg(target_os = "linux")]
        {
            let lib = Library::new("libopenal.so.1");
            if lib.is_ok() {
                return lib;
            }
            return Library::new("libopenal.so");
        }
        #[cfg(target_os = "macos")]
        return Library::new("/System/Library/Frameworks/OpenAL.framework/OpenAL");
    }
}

fn load_openal_binds(lib: &'static Result<Library, Error>) -> Result<AlBinds, AudioError> {
    let lib = match lib {
        Ok(lib) => lib,
        Err(err) => return Err(AudioError::LibraryUnavailable(err.to_string())),
    };

    fn bind<T>(lib: &'static Library, name: &'static str) -> Result<Symbol<'static, T>, AudioError> {
        unsafe { lib.get(name.as_bytes()) }.map_err(|_| AudioError::MissingSymbol(name))
    }

    Ok(AlBinds {
        alc_open_device: bind(lib, "alcOpenDevice")?,
        alc_create_context: bind(lib, "alcCreateContext")?,
        alc_make_context_current: bind(lib, "alcMakeContextCurrent")?,
        alc_destroy_context: bind(lib, "alcDestroyContext")?,
        alc_close_device: bind(lib, "alcCloseDevice")?,
        al_get_error: bind(lib, "alGetError")?,
        al_gen_buffers: bind(lib, "alGenBuffers")?,
        al_delete_buffers: bind(lib, "alDeleteBuffers")?,
        al_buffer_data: bind(lib, "alBufferData")?,
        al_gen_sources: bind(lib, "alGenSources")?,
        al_delete_sources: bind(lib, "alDeleteSources")?,
        al_sourcei: bind(lib, "alSourcei")?,
        al_source_play: bind(lib, "alSourcePlay")?,
        al_source_stop: bind(lib, "alSourceStop")?,
        is_device_open: AtomicBool::new(false),
    })
}

/// One sounding source and the buffer it plays.
#[derive(Debug, Clone, Copy)]
pub struct SourceHandle {
    source: u32,
    buffer: u32,
}

/// Plays voices through the system OpenAL implementation.
///
/// At most one sink is open at a time. Dropping it makes no context
/// current, destroys the context and closes the device.
pub struct OpenAlSink {
    binds: &'static AlBinds,
    device: *mut c_void,
    context: *mut c_void,
}

impl OpenAlSink {
    /// Load OpenAL on first use and open the default output device.
    pub fn open() -> Result<Self, AudioError> {
        match &*OPENAL {
            Ok(binds) => binds.open_device(),
            Err(err) => Err(err.clone()),
        }
    }

    fn check(&self, during: &'static str) -> Result<(), AudioError> {
        let code = unsafe { (self.binds.al_get_error)() };
        if code == AL_NO_ERROR {
            Ok(())
        } else {
            Err(AudioError::Call { code, during })
        }
    }
}

impl AudioSink for OpenAlSink {
    type Handle = SourceHandle;
    type Error = AudioError;

    fn start_voice(&mut self, frequency: f64, tone: &[i16]) -> Result<SourceHandle, AudioError> {
        let mut buffer = 0u32;
        let mut source = 0u32;
        unsafe {
            (self.binds.al_gen_buffers)(1, &mut buffer);
            (self.binds.al_buffer_data)(
                buffer,
                AL_FORMAT_MONO16,
                tone.as_ptr().cast(),
                (tone.len() * std::mem::size_of::<i16>()) as c_int,
                SAMPLE_RATE as c_int,
            );
            (self.binds.al_gen_sources)(1, &mut source);
            (self.binds.al_sourcei)(source, AL_BUFFER, buffer as c_int);
            (self.binds.al_source_play)(source);
        }

        if let Err(err) = self.check("start_voice") {
            unsafe {
                (self.binds.al_delete_sources)(1, &source);
                (self.binds.al_delete_buffers)(1, &buffer);
                // Drop whatever error the cleanup itself raised.
                (self.binds.al_get_error)();
            }
            return Err(err);
        }

        trace!(frequency, source, "voice playing");
        Ok(SourceHandle { source, buffer })
    }

    fn stop_voice(&mut self, voice: SourceHandle) -> Result<(), AudioError> {
        unsafe {
            (self.binds.al_source_stop)(voice.source);
            (self.binds.al_delete_sources)(1, &voice.source);
            (self.binds.al_delete_buffers)(1, &voice.buffer);
        }
        self.check("stop_voice")
    }
}

impl Drop for OpenAlSink {
    fn drop(&mut self) {
        unsafe {
            (self.binds.alc_make_context_current)(ptr::null_mut());
            (self.binds.alc_destroy_context)(self.context);
            (self.binds.alc_close_device)(self.device);
        }
        self.binds.is_device_open.store(false, Ordering::Release);
        debug!("closed OpenAL device");
    }
}

lazy_static! {
    static ref OPENAL_LIB: Result<Library, Error> = load_openal_lib();

    /// The OpenAL bindings. The library is loaded when first accessed.
    static ref OPENAL: Result<AlBinds, AudioError> = load_openal_binds(&OPENAL_LIB);
}
