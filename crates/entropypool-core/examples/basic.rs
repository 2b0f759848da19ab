//! Basic pool round trip.
//!
//! Creates a pool, feeds it a few bytes, extracts a key, then saves and
//! reloads it.
//!
//! Run: `cargo run --example basic`

use entropypool_core::{EntropyPool, load_from_file, save_to_file};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut pool = EntropyPool::with_defaults()?;
    println!("New pool: {}", pool.summary());

    // Claim one bit of entropy per byte of wall-clock noise
    let noise = format!("{:?}", std::time::SystemTime::now());
    pool.inject(noise.as_bytes(), noise.len() as u32)?;
    pool.inject(&[0x5A; 4096], 4096 * 8)?;

    let key = pool.extract(32)?;
    print!("Key (hex): ");
    for b in &key {
        print!("{b:02x}");
    }
    println!();

    let path = std::env::temp_dir().join("entropypool-example.bin");
    save_to_file(&mut pool, &path)?;
    let report = load_from_file(&path)?;
    println!("Reloaded ({}): {}", report.header.version, report.pool.summary());
    Ok(())
}
