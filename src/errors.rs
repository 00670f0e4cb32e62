//! Error categories for the consensus core.
//!
//! A single `error_chain!` invocation rather than a hand-rolled `enum` +
//! `impl std::error::Error`. Expected protocol rejections (stale term, log
//! mismatch, duplicate promise) are never turned into an `Err` here — they
//! are in-band `success: false` fields on reply payloads. Only invariant
//! violations (impossible role/message combinations) go through this
//! module.

error_chain! {
    foreign_links {
        Io(::std::io::Error);
    }

    errors {
        /// The replica observed an event it should be structurally
        /// incapable of observing in its current role. This always
        /// indicates a bug in the driver or in this crate, never a
        /// remote fault.
        InvariantViolation(role: String, term: u64, message: String) {
            description("invariant violation")
            display("invariant violation: role={} term={} while handling {}", role, term, message)
        }
    }
}
