//! Reader for `.mpy` v6 containers: just enough to reach every bytecode
//! function and decode its line-number table.
//!
//! Layout:
//!
//! ```text
//! header      'M' version feature-flags small-int-bits
//! n_qstr      uint, then n_qstr qstr entries
//! n_obj       uint, then n_obj constant objects
//! raw code    kind_len uint, fun_data, [n_children uint, children...]
//! ```
//!
//! Unsigned integers are big-endian groups of 7 bits, high bit set on every
//! byte but the last.

use crate::tracer::LineNo;
use std::collections::BTreeSet;
use thiserror::Error;

/// Supported container version
pub const MPY_VERSION: u8 = 6;

const MAGIC: u8 = b'M';

const MAX_PRELUDE_EXTENSIONS: u32 = 5;

const OBJ_FUN_TABLE: u8 = 0;
const OBJ_ELLIPSIS: u8 = 4;
const OBJ_STR: u8 = 5;
const OBJ_BYTES: u8 = 6;
const OBJ_COMPLEX: u8 = 9;
const OBJ_TUPLE: u8 = 10;

/// Malformed or unsupported `.mpy` data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpyError {
    /// First byte is not `M`
    #[error("not an .mpy file (magic byte {0:#04x})")]
    BadMagic(u8),

    /// Container version other than 6
    #[error("unsupported .mpy version {0} (expected 6)")]
    UnsupportedVersion(u8),

    /// Data ended early
    #[error("truncated at byte {offset} while reading {what}")]
    Truncated {
        /// Offset of the missing byte
        offset: usize,
        /// What was being read
        what: &'static str,
    },

    /// Constant object tag not defined by v6
    #[error("unknown constant object type {0}")]
    UnknownObjectType(u8),

    /// Encoding that no valid compiler output produces
    #[error("malformed {0}")]
    Malformed(&'static str),

    /// Native, viper or inline-assembler code
    #[error("{0} code is not supported; only bytecode can be analyzed")]
    UnsupportedCodeKind(CodeKind),
}

/// Kind of a raw code entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// Interpreted bytecode
    Bytecode,
    /// `@micropython.native`
    Native,
    /// `@micropython.viper`
    Viper,
    /// `@micropython.asm_*`
    Asm,
}

impl CodeKind {
    const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Bytecode,
            1 => Self::Native,
            2 => Self::Viper,
            _ => Self::Asm,
        }
    }
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Bytecode => "bytecode",
            Self::Native => "native",
            Self::Viper => "viper",
            Self::Asm => "inline assembler",
        })
    }
}

/// Decoded bytecode prelude signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signature {
    /// Value-stack plus locals size
    pub n_state: u32,
    /// Exception-stack depth
    pub n_exc_stack: u32,
    /// Scope flags
    pub scope_flags: u32,
    /// Positional arguments
    pub n_pos_args: u32,
    /// Keyword-only arguments
    pub n_kwonly_args: u32,
    /// Positional arguments with defaults
    pub n_def_pos_args: u32,
}

/// One compiled function (module body, function, class body, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCode {
    /// Prelude signature
    pub signature: Signature,
    /// Size of the `fun_data` blob
    pub fun_data_len: usize,
    /// Lines named by this function's line-number table
    pub lines: BTreeSet<LineNo>,
    /// Nested functions and classes
    pub children: Vec<RawCode>,
}

impl RawCode {
    /// Lines of this code object and every descendant
    #[must_use]
    pub fn all_lines(&self) -> BTreeSet<LineNo> {
        let mut lines = BTreeSet::new();
        self.collect_lines(&mut lines);
        lines
    }

    fn collect_lines(&self, lines: &mut BTreeSet<LineNo>) {
        lines.extend(self.lines.iter().copied());
        for child in &self.children {
            child.collect_lines(lines);
        }
    }

    /// Number of code objects in this tree
    #[must_use]
    pub fn code_count(&self) -> usize {
        1 + self.children.iter().map(Self::code_count).sum::<usize>()
    }
}

/// A parsed `.mpy` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpyModule {
    /// Container version
    pub version: u8,
    /// Feature byte (architecture in the upper six bits)
    pub feature_flags: u8,
    /// Number of qstr table entries
    pub qstr_count: usize,
    /// Number of constant objects
    pub object_count: usize,
    /// Module body
    pub raw_code: RawCode,
}

impl MpyModule {
    /// Parse a complete `.mpy` file
    ///
    /// # Errors
    ///
    /// Returns an [`MpyError`] for malformed, truncated or native data.
    pub fn parse(data: &[u8]) -> Result<Self, MpyError> {
        let mut reader = Reader::new(data);

        let magic = reader.byte("header")?;
        if magic != MAGIC {
            return Err(MpyError::BadMagic(magic));
        }
        let version = reader.byte("header")?;
        if version != MPY_VERSION {
            return Err(MpyError::UnsupportedVersion(version));
        }
        let feature_flags = reader.byte("header")?;
        let _small_int_bits = reader.byte("header")?;

        let qstr_count = reader.count("qstr count")?;
        for _ in 0..qstr_count {
            reader.qstr()?;
        }
        let object_count = reader.count("object count")?;
        for _ in 0..object_count {
            reader.object()?;
        }

        let raw_code = reader.raw_code()?;
        Ok(Self {
            version,
            feature_flags,
            qstr_count,
            object_count,
            raw_code,
        })
    }

    /// Architecture code from the feature byte (0: bytecode only)
    #[must_use]
    pub const fn arch(&self) -> u8 {
        self.feature_flags >> 2
    }

    /// Union of the line tables of every code object
    #[must_use]
    pub fn executable_lines(&self) -> BTreeSet<LineNo> {
        self.raw_code.all_lines()
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn byte(&mut self, what: &'static str) -> Result<u8, MpyError> {
        let byte = *self.data.get(self.pos).ok_or(MpyError::Truncated {
            offset: self.pos,
            what,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], MpyError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(MpyError::Truncated {
                offset: self.data.len(),
                what,
            });
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn uint(&mut self, what: &'static str) -> Result<u32, MpyError> {
        let mut value: u32 = 0;
        loop {
            let byte = self.byte(what)?;
            value = (value << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn count(&mut self, what: &'static str) -> Result<usize, MpyError> {
        self.uint(what).map(|n| n as usize)
    }

    fn qstr(&mut self) -> Result<(), MpyError> {
        let ln = self.count("qstr")?;
        if ln & 1 == 0 {
            // Dynamic qstr: data plus NUL terminator.
            self.bytes((ln >> 1) + 1, "qstr data")?;
        }
        Ok(())
    }

    fn object(&mut self) -> Result<(), MpyError> {
        let tag = self.byte("object type")?;
        match tag {
            OBJ_FUN_TABLE..=OBJ_ELLIPSIS => {}
            OBJ_TUPLE => {
                let len = self.count("tuple length")?;
                for _ in 0..len {
                    self.object()?;
                }
            }
            OBJ_STR | OBJ_BYTES => {
                let len = self.count("object length")?;
                self.bytes(len + 1, "object data")?;
            }
            tag if tag <= OBJ_COMPLEX => {
                let len = self.count("object length")?;
                self.bytes(len, "object data")?;
            }
            tag => return Err(MpyError::UnknownObjectType(tag)),
        }
        Ok(())
    }

    fn raw_code(&mut self) -> Result<RawCode, MpyError> {
        let kind_len = self.uint("raw code header")?;
        let kind = CodeKind::from_bits(kind_len);
        let has_children = (kind_len >> 2) & 1 == 1;
        let fun_data_len = (kind_len >> 3) as usize;
        let fun_data = self.bytes(fun_data_len, "function data")?;

        if kind != CodeKind::Bytecode {
            return Err(MpyError::UnsupportedCodeKind(kind));
        }
        let (signature, lines) = decode_prelude(fun_data)?;

        let mut children = Vec::new();
        if has_children {
            let n_children = self.count("child count")?;
            for _ in 0..n_children {
                children.push(self.raw_code()?);
            }
        }

        Ok(RawCode {
            signature,
            fun_data_len,
            lines,
            children,
        })
    }
}

/// Decode the prelude at the start of a bytecode function and return its
/// signature and the lines of its line-number table
fn decode_prelude(fun_data: &[u8]) -> Result<(Signature, BTreeSet<LineNo>), MpyError> {
    let mut reader = Reader::new(fun_data);
    let signature = decode_signature(&mut reader)?;
    let (n_info, _n_cell) = decode_sizes(&mut reader)?;

    let source_info = reader.pos;
    let line_info_end = source_info + n_info as usize;

    // simple_name, then one name per argument
    for _ in 0..(1 + signature.n_pos_args + signature.n_kwonly_args) {
        reader.uint("argument name")?;
    }
    if reader.pos > line_info_end || line_info_end > fun_data.len() {
        return Err(MpyError::Truncated {
            offset: line_info_end.min(fun_data.len()),
            what: "line info",
        });
    }

    let line_info = &fun_data[reader.pos..line_info_end];
    Ok((signature, decode_line_info(line_info)?))
}

fn decode_signature(reader: &mut Reader<'_>) -> Result<Signature, MpyError> {
    // xSSSSEAA
    let mut z = u32::from(reader.byte("prelude signature")?);
    let mut s = (z >> 3) & 0xf;
    let mut e = (z >> 2) & 0x1;
    let mut f = 0;
    let mut a = z & 0x3;
    let mut k = 0;
    let mut d = 0;
    let mut n = 0;
    while z & 0x80 != 0 {
        if n >= MAX_PRELUDE_EXTENSIONS {
            return Err(MpyError::Malformed("prelude signature"));
        }
        // xFSSKAED
        z = u32::from(reader.byte("prelude signature")?);
        s |= (z & 0x30) << (2 * n);
        e |= (z & 0x02) << n;
        f |= ((z & 0x40) >> 6) << n;
        a |= (z & 0x4) << n;
        k |= ((z & 0x08) >> 3) << n;
        d |= (z & 0x1) << n;
        n += 1;
    }
    Ok(Signature {
        n_state: s + 1,
        n_exc_stack: e,
        scope_flags: f,
        n_pos_args: a,
        n_kwonly_args: k,
        n_def_pos_args: d,
    })
}

fn decode_sizes(reader: &mut Reader<'_>) -> Result<(u32, u32), MpyError> {
    let mut info = 0u32;
    let mut cell = 0u32;
    let mut n = 0;
    loop {
        // xIIIIIIC
        let z = u32::from(reader.byte("prelude size")?);
        cell |= (z & 1) << n;
        info |= ((z & 0x7e) >> 1) << (6 * n);
        if z & 0x80 == 0 {
            return Ok((info, cell));
        }
        n += 1;
        if n >= MAX_PRELUDE_EXTENSIONS {
            return Err(MpyError::Malformed("prelude size"));
        }
    }
}

/// Decode a line-number table into the set of lines it names.
///
/// Entries are `0b0LLBBBBB` (small increments) or `0b1LLLBBBB 0bLLLLLLLL`.
/// A line counts once it is reached by a non-empty increment.
pub(crate) fn decode_line_info(mut info: &[u8]) -> Result<BTreeSet<LineNo>, MpyError> {
    let mut lines = BTreeSet::new();
    let mut line: LineNo = 1;
    while let Some((&c, rest)) = info.split_first() {
        let (bc_inc, line_inc, rest) = if c & 0x80 == 0 {
            (c & 0x1f, u32::from(c >> 5), rest)
        } else {
            let (&next, rest) = rest.split_first().ok_or(MpyError::Truncated {
                offset: 0,
                what: "line info entry",
            })?;
            (c & 0x0f, ((u32::from(c) << 4) & 0x700) | u32::from(next), rest)
        };
        line = line.saturating_add(line_inc);
        if bc_inc > 0 || line_inc > 0 {
            lines.insert(line);
        }
        info = rest;
    }
    Ok(lines)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;

    fn uint(mut value: u32) -> Vec<u8> {
        let mut groups = vec![(value & 0x7f) as u8];
        value >>= 7;
        while value > 0 {
            groups.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
        groups.reverse();
        groups
    }

    /// Bytecode function with `n_args` positional args and the given line table
    pub(crate) fn bytecode_fun(n_args: u8, line_info: &[u8]) -> Vec<u8> {
        assert!(n_args < 4);
        let names = 1 + usize::from(n_args);
        let n_info = names + line_info.len();
        assert!(n_info < 64);
        let mut fun = vec![n_args, (n_info as u8) << 1];
        fun.extend(std::iter::repeat(0x02).take(names));
        fun.extend_from_slice(line_info);
        fun.extend_from_slice(&[0x51, 0x63]);
        fun
    }

    pub(crate) fn raw_code(fun: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
        let kind_len = ((fun.len() as u32) << 3) | (u32::from(!children.is_empty()) << 2);
        let mut out = uint(kind_len);
        out.extend_from_slice(fun);
        if !children.is_empty() {
            out.extend(uint(children.len() as u32));
            for child in children {
                out.extend_from_slice(child);
            }
        }
        out
    }

    pub(crate) fn module(raw: &[u8]) -> Vec<u8> {
        let mut out = vec![b'M', 6, 0, 31];
        // two qstrs: one static, one dynamic "app.py"
        out.extend(uint(2));
        out.extend(uint((5 << 1) | 1));
        out.extend(uint(6 << 1));
        out.extend_from_slice(b"app.py\0");
        // objects: str "hi", tuple(None, int)
        out.extend(uint(2));
        out.push(OBJ_STR);
        out.extend(uint(2));
        out.extend_from_slice(b"hi\0");
        out.push(OBJ_TUPLE);
        out.extend(uint(2));
        out.push(1);
        out.push(7);
        out.extend(uint(1));
        out.push(0x2a);
        out.extend_from_slice(raw);
        out
    }

    mod uint_tests {
        use super::*;

        #[test]
        fn test_multi_byte_uint() {
            let data = uint(300);
            assert_eq!(data, vec![0x82, 0x2c]);
            let mut reader = Reader::new(&data);
            assert_eq!(reader.uint("test").unwrap(), 300);
        }

        #[test]
        fn test_truncated_uint() {
            let mut reader = Reader::new(&[0x81]);
            assert!(matches!(
                reader.uint("test"),
                Err(MpyError::Truncated { offset: 1, .. })
            ));
        }
    }

    mod line_info_tests {
        use super::*;

        #[test]
        fn test_short_entries() {
            // line 1 (+0, bc 2), line 2 (+1), line 4 (+2)
            let lines = decode_line_info(&[0x02, 0x23, 0x44]).unwrap();
            assert_eq!(lines, BTreeSet::from([1, 2, 4]));
        }

        #[test]
        fn test_long_entry() {
            // +300 lines, bc 1: 0b1LLLBBBB with LLL = 300 >> 8 = 1
            let lines = decode_line_info(&[0x80 | 0x10 | 0x01, (300u16 & 0xff) as u8]).unwrap();
            assert_eq!(lines, BTreeSet::from([301]));
        }

        #[test]
        fn test_empty_increment_is_skipped() {
            let lines = decode_line_info(&[0x00, 0x21]).unwrap();
            assert_eq!(lines, BTreeSet::from([2]));
        }

        #[test]
        fn test_truncated_long_entry() {
            assert!(decode_line_info(&[0x90]).is_err());
        }
    }

    mod container_tests {
        use super::*;

        #[test]
        fn test_parse_module_with_child() {
            // module: lines 1 and 5; child function (1 arg): lines 2 and 3
            let child = raw_code(&bytecode_fun(1, &[0x22, 0x21]), &[]);
            let body = raw_code(&bytecode_fun(0, &[0x01, 0x84, 0x04]), &[child]);
            let module = MpyModule::parse(&module(&body)).unwrap();

            assert_eq!(module.qstr_count, 2);
            assert_eq!(module.object_count, 2);
            assert_eq!(module.arch(), 0);
            assert_eq!(module.raw_code.code_count(), 2);
            assert_eq!(module.raw_code.children[0].signature.n_pos_args, 1);
            assert_eq!(module.executable_lines(), BTreeSet::from([1, 2, 3, 5]));
        }

        #[test]
        fn test_bad_magic_and_version() {
            assert_eq!(MpyModule::parse(b"X\x06\x00\x1f"), Err(MpyError::BadMagic(b'X')));
            assert_eq!(
                MpyModule::parse(b"M\x05\x00\x1f"),
                Err(MpyError::UnsupportedVersion(5))
            );
        }

        #[test]
        fn test_native_code_is_rejected() {
            let fun = bytecode_fun(0, &[0x01]);
            let mut raw = uint(((fun.len() as u32) << 3) | 1);
            raw.extend_from_slice(&fun);
            let err = MpyModule::parse(&module(&raw)).unwrap_err();
            assert_eq!(err, MpyError::UnsupportedCodeKind(CodeKind::Native));
        }

        #[test]
        fn test_truncated_function_data() {
            let body = raw_code(&bytecode_fun(0, &[0x01]), &[]);
            let data = module(&body);
            let err = MpyModule::parse(&data[..data.len() - 2]).unwrap_err();
            assert!(matches!(err, MpyError::Truncated { .. }));
        }
    }
}
