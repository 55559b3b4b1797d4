//! TLV dump command implementation.

use std::io::{self, Write};

use asnwalk_ber::{pkix, BerDecoder, Reader};

pub fn run(schema: Option<&str>, files: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for file in files {
        let data = crate::input::load(file)?;
        if files.len() > 1 {
            writeln!(out, "{file}:")?;
        }
        dump_bytes(&data, schema, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn dump_bytes<W: Write>(
    data: &[u8],
    schema: Option<&str>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    match schema {
        Some(entry) => {
            BerDecoder::new(pkix::module()?, Reader::from_slice(data)).dump(Some(entry), out)?
        }
        None => BerDecoder::from_slice(data).dump(None, out)?,
    }
    Ok(())
}
