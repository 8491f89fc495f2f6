use scad_bus::STL_ASCII_PREFIX;

/// STL payload produced by a backend, tagged with the wire format it was
/// actually received in. The binary form is only ever an intermediate:
/// the contract published to hosts is always ASCII.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StlEncoding {
    Ascii,
    Binary,
}

#[derive(Clone, Debug)]
pub struct StlArtifact {
    pub encoding: StlEncoding,
    pub bytes: Vec<u8>,
}

impl StlArtifact {
    pub fn detect(bytes: Vec<u8>) -> Self {
        let encoding = if looks_ascii(&bytes) {
            StlEncoding::Ascii
        } else {
            StlEncoding::Binary
        };
        Self { encoding, bytes }
    }

    /// Returns the ASCII form of this artifact, converting from binary STL
    /// if necessary. Binary STL has an 80-byte header, a little-endian
    /// `u32` facet count, then 50 bytes per facet (12 floats + a 2-byte
    /// attribute count).
    pub fn into_ascii(self) -> Vec<u8> {
        match self.encoding {
            StlEncoding::Ascii => self.bytes,
            StlEncoding::Binary => binary_to_ascii(&self.bytes, "model"),
        }
    }
}

fn looks_ascii(bytes: &[u8]) -> bool {
    bytes.len() >= STL_ASCII_PREFIX.len() && bytes.starts_with(STL_ASCII_PREFIX.as_bytes())
}

const BINARY_HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

fn binary_to_ascii(bytes: &[u8], name: &str) -> Vec<u8> {
    if bytes.len() < BINARY_HEADER_LEN + 4 {
        return format!("solid {name}\nendsolid {name}\n").into_bytes();
    }

    let facet_count = u32::from_le_bytes(
        bytes[BINARY_HEADER_LEN..BINARY_HEADER_LEN + 4]
            .try_into()
            .expect("slice of length 4"),
    ) as usize;

    let mut out = String::with_capacity(facet_count * 200 + 32);
    out.push_str(&format!("solid {name}\n"));

    let body = &bytes[BINARY_HEADER_LEN + 4..];
    for i in 0..facet_count {
        let start = i * FACET_LEN;
        let end = start + FACET_LEN;
        let Some(facet) = body.get(start..end) else {
            break;
        };
        let floats: Vec<f32> = facet[..48]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("slice of length 4")))
            .collect();
        out.push_str(&format!(
            "facet normal {} {} {}\n",
            floats[0], floats[1], floats[2]
        ));
        out.push_str("outer loop\n");
        for v in 0..3 {
            let base = 3 + v * 3;
            out.push_str(&format!(
                "vertex {} {} {}\n",
                floats[base], floats[base + 1], floats[base + 2]
            ));
        }
        out.push_str("endloop\nendfacet\n");
    }
    out.push_str(&format!("endsolid {name}\n"));
    out.into_bytes()
}
