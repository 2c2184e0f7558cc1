#![no_main]

use fsp_solver::{phi, phi_inverse};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 9 {
        return;
    }

    // First byte picks the dimension; the rest is one little-endian z.
    let n = (data[0] % 6) as usize + 1;
    let z = u64::from_le_bytes([
        data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8],
    ]);

    let x = phi_inverse(z, n);
    assert_eq!(x.len(), n);
    assert_eq!(phi(&x), Some(z), "phi(phi_inverse({z}, {n})) != {z}");
});
