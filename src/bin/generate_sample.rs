//! Writes a synthetic titration series: one instrument export per spectrum
//! plus a matching `metadata.csv`.
//!
//! ```bash
//! generate_sample [OUTPUT_DIR]   # default: sample_data/
//! ```

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Peaks on a slowly varying fluorescence background, plus noise.
fn generate_spectrum(
    shifts: &[f64],
    peaks: &[(f64, f64, f64)],
    background: [f64; 3],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let mid = (shifts[0] + shifts[shifts.len() - 1]) / 2.0;
    shifts
        .iter()
        .map(|&wn| {
            let t = (wn - mid) / 1000.0;
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wn, mu, sigma, amp))
                .sum();
            let baseline = background[0] + background[1] * t + background[2] * t * t;
            signal + baseline + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Instrument export text: acquisition header, then the `Pixel;` table with
/// comma decimals.
fn instrument_export(name: &str, shifts: &[f64], intensity: &[f64]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File Version;BWSpec4.11_1");
    let _ = writeln!(out, "title;{name}");
    let _ = writeln!(out, "laser_wavelength;532,00");
    let _ = writeln!(out, "integration times(ms);1000");
    let _ = writeln!(out, "Pixel;Raman Shift;Dark Subtracted #1;");
    for (pixel, (&x, &y)) in shifts.iter().zip(intensity).enumerate() {
        let _ = writeln!(
            out,
            "{pixel};{};{};",
            format!("{x:.4}").replace('.', ","),
            format!("{y:.4}").replace('.', ",")
        );
    }
    out
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // Raman shift axis: 200 → 1800 cm⁻¹, step 1.6
    let shifts: Vec<f64> = (0..1000).map(|i| 200.0 + i as f64 * 1.6).collect();

    // EGTA additions (mol); the 1327 band grows and the 1358 band shrinks.
    let quantities = [0.0, 2.0e-7, 4.0e-7, 6.0e-7, 8.0e-7, 1.0e-6];
    let replicates = 2;

    let mut metadata = String::from("Spectrum name;Sample description;n(EGTA) (mol)\n");
    let mut index = 1;
    for (step, &n) in quantities.iter().enumerate() {
        let fraction = step as f64 / (quantities.len() - 1) as f64;
        let peaks = [
            (1231.0, 6.0, 300.0),
            (1327.0, 5.0, 200.0 + 400.0 * fraction),
            (1342.0, 5.0, 250.0),
            (1358.0, 5.0, 600.0 - 350.0 * fraction),
            (1450.0, 8.0, 350.0),
        ];
        for _ in 0..replicates {
            let name = format!("S{index:02}");
            let background = [800.0 + rng.gauss(0.0, 40.0), 150.0, -60.0];
            let y = generate_spectrum(&shifts, &peaks, background, 5.0, &mut rng);
            let path = out_dir.join(format!("{name}.txt"));
            std::fs::write(&path, instrument_export(&name, &shifts, &y))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let _ = writeln!(metadata, "{name};Titration EGTA;{n:e}");
            index += 1;
        }
    }

    // Buffer blank, dropped by default on assembly.
    let name = format!("S{index:02}");
    let y = generate_spectrum(&shifts, &[], [700.0, 120.0, -50.0], 5.0, &mut rng);
    let path = out_dir.join(format!("{name}.txt"));
    std::fs::write(&path, instrument_export(&name, &shifts, &y))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    let _ = writeln!(metadata, "{name};Cuvette BRB;");

    let metadata_path = out_dir.join("metadata.csv");
    std::fs::write(&metadata_path, metadata)
        .with_context(|| format!("Failed to write {}", metadata_path.display()))?;

    println!(
        "Wrote {index} spectra ({} samples each) and {} to {}",
        shifts.len(),
        metadata_path.display(),
        out_dir.display()
    );
    Ok(())
}
