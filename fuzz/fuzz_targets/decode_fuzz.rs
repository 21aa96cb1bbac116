//! Decoder fuzz target: feed arbitrary bytes to the reference decoder for every
//! catalog type. Decoding must not panic and must never claim more bytes than it got;
//! anything it accepts must re-encode to the same length, and that encoding must be stable.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let suite = match wiregen::catalog::codegen_test() {
        Ok(s) => s,
        Err(_) => return,
    };
    let codec = wiregen::Codec::new(&suite.registry);
    for def in suite.registry.definitions() {
        let ty = wiregen::Ty::Named(def.name.clone());
        if let Ok((value, used)) = codec.decode(&ty, data) {
            assert!(used <= data.len());
            if let Ok(bytes) = codec.encode(&ty, &value) {
                // Padding comes back as zeros, so the first re-encoding is the fixed point.
                assert_eq!(bytes.len(), used);
                let (again, again_used) = codec.decode(&ty, &bytes).expect("re-decode");
                assert_eq!(again_used, bytes.len());
                assert_eq!(codec.encode(&ty, &again).expect("re-encode"), bytes);
            }
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
