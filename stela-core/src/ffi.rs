//! C ABI for linking stela-core as a static library into the native phone app.
//! The phone app owns the watch connection; it feeds received frames in and polls
//! frames to send.

use std::cmp::Ordering;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::article::Article;
use crate::phone::{PhoneConfig, PhoneCore};
use crate::transport::{dispatch, Outbox};
use crate::version::Version;

/// Version of this library.
#[no_mangle]
pub extern "C" fn stela_version_current() -> Version {
    Version::current()
}

/// Positive if a > b, negative if a < b, zero if equal.
#[no_mangle]
pub extern "C" fn stela_version_compare(a: Version, b: Version) -> c_int {
    match Version::compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[no_mangle]
pub extern "C" fn stela_version_is_unknown(v: Version) -> bool {
    v.is_unknown()
}

/// Parse a NUL-terminated "major.minor.patch" string. Returns 0.255.255 on any error,
/// including a null pointer.
#[no_mangle]
pub extern "C" fn stela_string_to_version(s: *const c_char) -> Version {
    if s.is_null() {
        return Version::UNKNOWN;
    }
    let s = unsafe { CStr::from_ptr(s) };
    match s.to_str() {
        Ok(s) => Version::parse(s),
        Err(_) => Version::UNKNOWN,
    }
}

/// Write the version as a NUL-terminated string. Returns the string length (without NUL),
/// or -1 if out_buf is null or too small.
#[no_mangle]
pub extern "C" fn stela_version_to_string(v: Version, out_buf: *mut c_char, out_len: usize) -> c_int {
    let s = v.to_string();
    if out_buf.is_null() || out_len < s.len() + 1 {
        return -1;
    }
    unsafe {
        out_buf.copy_from_nonoverlapping(s.as_ptr() as *const c_char, s.len());
        *out_buf.add(s.len()) = 0;
    }
    s.len() as c_int
}

/// Phone core plus the frames it has produced but the host has not picked up yet.
struct PhoneHandle {
    core: PhoneCore,
    outbox: Outbox,
}

impl PhoneHandle {
    fn queue(&mut self, actions: Vec<crate::core::OutboundAction>) -> c_int {
        let before = self.outbox.len();
        match dispatch(&mut self.outbox, actions) {
            Ok(rest) => {
                for event in rest {
                    log::debug!("ffi: unhandled event {:?}", event);
                }
                (self.outbox.len() - before) as c_int
            }
            Err(_) => -1,
        }
    }
}

/// Create a phone core. max_message_size 0 selects the default. Returns an opaque handle.
#[no_mangle]
pub extern "C" fn stela_phone_create(max_message_size: usize) -> *mut c_void {
    let mut config = PhoneConfig::default();
    if max_message_size != 0 {
        config.max_message_size = max_message_size;
    }
    let handle = PhoneHandle {
        core: PhoneCore::with_config(config),
        outbox: Outbox::new(),
    };
    Box::into_raw(Box::new(handle)) as *mut c_void
}

/// Destroy a phone core. No-op if h is null.
#[no_mangle]
pub extern "C" fn stela_phone_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut PhoneHandle) };
}

/// Start pushing a new article from NUL-terminated UTF-8 text. Queues RESET and layout
/// frames. Returns the number of frames queued, or -1 on error.
#[no_mangle]
pub extern "C" fn stela_phone_load_text(
    h: *mut c_void,
    text: *const c_char,
    text_block_size: u16,
) -> c_int {
    if h.is_null() || text.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *(h as *mut PhoneHandle) };
    let Ok(text) = unsafe { CStr::from_ptr(text) }.to_str() else {
        return -1;
    };
    let article = match Article::from_text(text, text_block_size as usize) {
        Ok(a) => a,
        Err(_) => return -1,
    };
    match handle.core.begin_article(article) {
        Ok(actions) => handle.queue(actions),
        Err(_) => -1,
    }
}

/// Feed a frame received from the watch. Returns the number of reply frames queued, or -1
/// if the frame could not be decoded.
#[no_mangle]
pub extern "C" fn stela_phone_on_message(h: *mut c_void, bytes: *const u8, len: usize) -> c_int {
    if h.is_null() || bytes.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *(h as *mut PhoneHandle) };
    let frame = unsafe { slice::from_raw_parts(bytes, len) };
    match handle.core.on_message_received(frame) {
        Ok(actions) => handle.queue(actions),
        Err(_) => -1,
    }
}

/// Copy the next queued frame into out_buf and dequeue it. Returns bytes written, 0 when
/// nothing is queued, or -1 if out_buf is null or too small (the frame stays queued).
#[no_mangle]
pub extern "C" fn stela_phone_next_frame(h: *mut c_void, out_buf: *mut u8, out_len: usize) -> c_int {
    if h.is_null() || out_buf.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *(h as *mut PhoneHandle) };
    let Some(frame) = handle.outbox.front() else {
        return 0;
    };
    if frame.len() > out_len {
        return -1;
    }
    let n = frame.len();
    unsafe {
        out_buf.copy_from_nonoverlapping(frame.as_ptr(), n);
    }
    handle.outbox.pop();
    n as c_int
}

/// Version last reported by the watch, or 0.255.255 if none yet.
#[no_mangle]
pub extern "C" fn stela_phone_watch_version(h: *mut c_void) -> Version {
    if h.is_null() {
        return Version::UNKNOWN;
    }
    let handle = unsafe { &*(h as *const PhoneHandle) };
    handle.core.watch_version().unwrap_or(Version::UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_message, encode_message, Direction, Message, MAX_MESSAGE_SIZE};
    use std::ffi::CString;

    #[test]
    fn version_helpers() {
        let s = CString::new("1.2.3").unwrap();
        let v = stela_string_to_version(s.as_ptr());
        assert_eq!(v, Version::new(1, 2, 3));
        assert!(stela_version_is_unknown(stela_string_to_version(std::ptr::null())));
        assert_eq!(stela_version_compare(v, Version::new(1, 2, 4)), -1);
        assert_eq!(stela_version_compare(v, v), 0);
        assert_eq!(stela_version_compare(Version::new(2, 0, 0), v), 1);

        let mut buf = [0 as c_char; 16];
        let n = stela_version_to_string(Version::new(10, 0, 255), buf.as_mut_ptr(), buf.len());
        assert_eq!(n, 8);
        let out = unsafe { CStr::from_ptr(buf.as_ptr()) };
        assert_eq!(out.to_str().unwrap(), "10.0.255");
        assert_eq!(stela_version_to_string(v, buf.as_mut_ptr(), 3), -1);
    }

    #[test]
    fn phone_handle_queues_and_drains_frames() {
        let h = stela_phone_create(0);
        let text = CString::new("one two three four five six seven").unwrap();
        assert_eq!(stela_phone_load_text(h, text.as_ptr(), 3), 2);

        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let mut got = Vec::new();
        loop {
            let n = stela_phone_next_frame(h, buf.as_mut_ptr(), buf.len());
            assert!(n >= 0);
            if n == 0 {
                break;
            }
            got.push(decode_message(&buf[..n as usize], Direction::PhoneToWatch).unwrap());
        }
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Some(Message::Reset));

        let request = encode_message(&Message::BlockRequest { block_number: 2 }, MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(stela_phone_on_message(h, request.as_ptr(), request.len()), 1);
        assert_eq!(stela_phone_next_frame(h, buf.as_mut_ptr(), 4), -1);
        let n = stela_phone_next_frame(h, buf.as_mut_ptr(), buf.len());
        assert!(n > 0);
        assert_eq!(stela_phone_next_frame(h, buf.as_mut_ptr(), buf.len()), 0);

        assert!(stela_version_is_unknown(stela_phone_watch_version(h)));
        stela_phone_destroy(h);
    }

    #[test]
    fn null_handles_are_rejected() {
        let mut buf = [0u8; 8];
        assert_eq!(stela_phone_next_frame(std::ptr::null_mut(), buf.as_mut_ptr(), 8), -1);
        assert_eq!(stela_phone_on_message(std::ptr::null_mut(), buf.as_ptr(), 0), -1);
        stela_phone_destroy(std::ptr::null_mut());
    }
}
