//! Schema listing command implementation.

use std::io::{self, Write};

use asnwalk_ber::pkix;

pub fn run(name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_schema(name, &mut out)?;
    out.flush()?;
    Ok(())
}

fn write_schema<W: Write>(name: Option<&str>, out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    let module = pkix::module()?;
    match name {
        Some(entry) => module.dump_tree(entry, out)?,
        None => {
            writeln!(out, "{} DEFINITIONS", module.name())?;
            for assignment in module.assignments() {
                writeln!(out, "  {assignment}")?;
            }
        }
    }
    Ok(())
}
