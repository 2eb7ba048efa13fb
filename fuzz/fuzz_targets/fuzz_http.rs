//! Fuzz target for the HTTP request/response parsers.

#![no_main]

use flowprint_core::fingerprint::{Fingerprint, FingerprintType};
use flowprint_core::protocol::http::{HttpRequest, HttpResponse};
use flowprint_core::Cursor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let request = HttpRequest::parse(&mut c);
    if request.is_not_empty() {
        let _ = request.user_agent();
        let _ = Fingerprint::build(FingerprintType::Http, |b| request.fingerprint(b));
    }

    let mut c = Cursor::new(data);
    let response = HttpResponse::parse(&mut c);
    if response.is_not_empty() {
        let _ = Fingerprint::build(FingerprintType::HttpServer, |b| response.fingerprint(b));
    }
});
