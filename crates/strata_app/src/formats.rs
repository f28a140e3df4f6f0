//! The `formats` command: list registered extensions and signatures.

use anyhow::Result;
use std::io::Write;
use strata_core::FILE_HEADERS;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn run(mut out: impl Write) -> Result<()> {
    writeln!(out, "{:<8} {:<36} SIGNATURES", "NAME", "DESC")?;
    for hdr in FILE_HEADERS {
        let signatures: Vec<String> = hdr.signatures.iter().map(|s| hex(s)).collect();
        writeln!(
            out,
            "{:<8} {:<36} {}",
            hdr.ext,
            hdr.description,
            signatures.join(",")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_builtin() {
        let mut buf = Vec::new();
        run(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        for hdr in FILE_HEADERS {
            assert!(text.contains(hdr.ext), "missing {}", hdr.ext);
        }
        assert!(text.contains("89504e470d0a1a0a")); // the PNG signature
        assert!(text.contains("494433")); // "ID3"
    }
}
