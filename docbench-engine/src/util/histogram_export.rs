//! Exports [Histogram]s to the "Histogram Percentiles Text Export" `.hgrm` format, then gzips
//! and Base64-encodes the text so it can ride along inside JSON/HTML reports without dominating
//! them. The plain format looks like:
//!
//! ```text
//!        Value   Percentile   TotalCount 1/(1-Percentile)
//!
//!          16     0.000000            1           1.00
//!         980     0.100000        47530           1.11
//! ...
//!     #[Mean    =        25.05, StdDeviation   =       120.10]
//!     #[Max     =      9420800, Total count    =       475109]
//! ```

use anyhow::Result;
use hdrhistogram::Histogram;

/// Reporting points per exponentially decreasing half-distance; five matches the reference HDR
/// histogram tooling's default.
const PERCENTILE_TICKS_PER_HALF_DISTANCE: u32 = 5;

/// Renders the percentile-distribution text for the histogram.
pub fn to_hgrm(histogram: &Histogram<u64>) -> String {
    let mut export = String::new();
    export.push_str(&format!(
        "{:>12} {:>12} {:>12} {:>16}\n\n",
        "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
    ));

    let mut cumulative = 0;
    for step in histogram.iter_quantiles(PERCENTILE_TICKS_PER_HALF_DISTANCE) {
        cumulative += step.count_since_last_iteration();
        let quantile = step.quantile_iterated_to();
        if quantile < 1.0 {
            export.push_str(&format!(
                "{:>12} {:>12.6} {:>12} {:>16.2}\n",
                step.value_iterated_to(),
                quantile,
                cumulative,
                1.0 / (1.0 - quantile)
            ));
        } else {
            export.push_str(&format!(
                "{:>12} {:>12.6} {:>12} {:>16}\n",
                step.value_iterated_to(),
                quantile,
                cumulative,
                "inf"
            ));
        }
    }

    export.push_str(&format!(
        "#[Mean    = {:12.2}, StdDeviation   = {:12.2}]\n",
        histogram.mean(),
        histogram.stdev()
    ));
    export.push_str(&format!(
        "#[Max     = {:12}, Total count    = {:12}]\n",
        histogram.max(),
        histogram.len()
    ));

    export
}

/// Renders the `.hgrm` text, then gzips and Base64-encodes it.
pub fn to_hgrm_gzip(histogram: &Histogram<u64>) -> Result<String> {
    use std::io::Write;

    let export = to_hgrm(histogram);
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(export.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(base64::encode(compressed))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use hdrhistogram::Histogram;
    use std::io::Read;

    fn sample_histogram() -> Result<Histogram<u64>> {
        let mut histogram = Histogram::<u64>::new(3)?;
        for value in 1..=1000u64 {
            histogram.record(value * 1000)?;
        }
        Ok(histogram)
    }

    /// Verifies the shape of the plain text export.
    #[test]
    fn hgrm_text_shape() -> Result<()> {
        let export = super::to_hgrm(&sample_histogram()?);

        assert!(export.starts_with("       Value   Percentile"));
        assert!(export.contains("1/(1-Percentile)"));
        assert!(export.contains("#[Mean"));
        assert!(export.contains("Total count"));
        assert!(export.lines().count() > 10);
        Ok(())
    }

    /// Verifies that the gzip+Base64 form decodes back to the plain text.
    #[test]
    fn gzip_round_trip() -> Result<()> {
        let histogram = sample_histogram()?;
        let expected = super::to_hgrm(&histogram);

        let encoded = super::to_hgrm_gzip(&histogram)?;
        let compressed = base64::decode(encoded)?;
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded)?;

        assert_eq!(expected, decoded);
        Ok(())
    }
}
