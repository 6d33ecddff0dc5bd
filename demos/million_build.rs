use chd_mphf::{BuildConfig, Builder, MphError, Mphf};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() -> Result<(), MphError> {
    println!("--- chd_mphf test ---");
    println!("n = {N_KEYS}");

    // 1) Generate unique keys
    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let gen_s = t0.elapsed().as_secs_f64();
    println!(
        "gen:    {:>8.3} s   ({:.1} M keys/s)",
        gen_s,
        N_KEYS as f64 / gen_s / 1e6
    );

    // 2) Build MPH
    let cfg = BuildConfig {
        load_factor: 0.99,
        ..Default::default()
    };
    let t1 = Instant::now();
    let mph = Builder::new()
        .with_config(cfg)
        .build(keys.iter().map(|v| v.as_slice()))?;
    let build_s = t1.elapsed().as_secs_f64();
    println!(
        "build:  {:>8.3} s   ({:.1} M keys/s)",
        build_s,
        N_KEYS as f64 / build_s / 1e6
    );
    println!(
        "range:  {} for {} keys (load {:.4}), {:.3} bits/key",
        mph.max_value(),
        N_KEYS,
        N_KEYS as f64 / mph.max_value() as f64,
        mph.size_in_bytes() as f64 * 8.0 / N_KEYS as f64
    );

    // 3) Lookup all keys and check for collisions
    let t2 = Instant::now();
    let mut used = vec![false; mph.max_value() as usize];
    for (i, k) in keys.iter().enumerate() {
        let h = mph.index(k) as usize;
        if used[h] {
            println!("FAILED - collision detected at {i}");
            return Ok(());
        }
        used[h] = true;
    }
    let lookup_s = t2.elapsed().as_secs_f64();
    println!(
        "lookup: {:>8.3} s   ({:.1} ns/key), no collision",
        lookup_s,
        lookup_s * 1e9 / N_KEYS as f64
    );

    // 4) Dump / load
    let t3 = Instant::now();
    let bytes = mph.dump();
    let loaded: Mphf = Mphf::load(&bytes)?;
    let mismatches = keys.iter().filter(|k| loaded.index(k) != mph.index(k)).count();
    println!(
        "dump:   {:>8.3} s   ({} bytes, {} mismatches after load)",
        t3.elapsed().as_secs_f64(),
        bytes.len(),
        mismatches
    );
    Ok(())
}

fn gen_unique_keys(n: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(n);
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let mut k = vec![0u8; 16];
        rng.fill_bytes(&mut k);
        if seen.insert(k.clone()) {
            out.push(k);
        }
    }
    out
}
