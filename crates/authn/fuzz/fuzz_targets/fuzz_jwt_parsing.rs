//! Fuzz target for unverified JWT inspection.
//!
//! Feeds arbitrary byte strings as tokens to the functions that run before
//! any signature check. Every result must be either `Ok(...)` or
//! `Err(AuthError)`; none of them may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use carebase_common_authn::{
    jwt::{decode_jwt_header, peek_algorithm, peek_key_version},
    validation::{validate_algorithm, validate_key_version},
};

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8, as tokens arrive as strings
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    let _ = decode_jwt_header(token);

    if let Ok(alg) = peek_algorithm(token) {
        let _ = validate_algorithm(&alg);
    }

    if let Ok(Some(version)) = peek_key_version(token) {
        let _ = validate_key_version(&version);
    }
});
