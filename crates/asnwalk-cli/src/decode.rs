//! Schema-guided decode command implementation.

use std::io::{self, Write};

use asnwalk_ber::{pkix, BerDecoder, BerError, DecoderConfig, Reader};

/// Decoder switches exposed on the command line.
pub struct Options {
    pub fast_stop: bool,
    pub tolerate_garbage: bool,
    pub debug: bool,
}

pub fn run(
    schema: &str,
    options: Options,
    field: Option<&str>,
    file: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = crate::input::load(file)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    decode_bytes(&data, schema, &options, field, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Decode every top-level value of `data` in turn.
fn decode_bytes<W: Write>(
    data: &[u8],
    schema: &str,
    options: &Options,
    field: Option<&str>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = DecoderConfig::builder()
        .debug(options.debug)
        .fast_stop(options.fast_stop)
        .tolerate_garbage(options.tolerate_garbage)
        .build();
    let mut decoder =
        BerDecoder::new(pkix::module()?, Reader::from_slice(data)).with_config(config);

    let mut count = 0usize;
    loop {
        let decoded = match decoder.decode(schema) {
            Ok(decoded) => decoded,
            Err(BerError::Eof) if count > 0 => break,
            Err(e) => return Err(e.into()),
        };
        count += 1;
        match field {
            Some(path) => {
                let raw = decoded
                    .raw_at(path)
                    .ok_or_else(|| format!("{path}: not present in value {count}"))?;
                writeln!(out, "{}", hex::encode(raw))?;
            }
            None => decoded.tree.dump(out)?,
        }
        if options.fast_stop {
            break;
        }
    }
    Ok(())
}
