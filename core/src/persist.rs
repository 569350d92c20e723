//! Single-file persistence for the IRIX index format.
//!
//! Layout (all integers and doubles little-endian): a 24-byte header
//! (magic `IRIX`, version, section_count, section_table_off), the META,
//! DICT, POSTINGS and FORWARD sections in write order, then the section
//! table. The header's count and table offset are written as zero
//! placeholders and patched with a seek once the table position is known.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::index::{
    DictEntry, DocInfo, Index, IndexMeta, SectionInfo, MAGIC, SECTION_DICT, SECTION_FORWARD,
    SECTION_META, SECTION_POSTINGS, VERSION,
};
use crate::{Error, Result};

/// Longest term the DICT section can hold (16-bit length prefix).
pub const MAX_TERM_BYTES: usize = u16::MAX as usize;

/// Serialize an index to `path` in a single pass.
pub fn write_index(path: &Path, index: &Index) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    out.write_all(&MAGIC)?;
    out.write_u32::<LittleEndian>(VERSION)?;
    out.write_u32::<LittleEndian>(0)?; // section_count, patched below
    out.write_u64::<LittleEndian>(0)?; // section_table_off, patched below

    let mut sections: Vec<SectionInfo> = Vec::with_capacity(4);

    // META
    {
        let start = out.stream_position()?;
        let meta = &index.meta;
        out.write_u32::<LittleEndian>(meta.docs_count)?;
        out.write_u64::<LittleEndian>(meta.total_tokens)?;
        out.write_u32::<LittleEndian>(meta.unique_terms)?;
        out.write_f64::<LittleEndian>(meta.avg_term_len)?;
        out.write_f64::<LittleEndian>(meta.build_ms)?;
        push_section(&mut sections, SECTION_META, start, out.stream_position()?);
    }

    // DICT
    {
        let start = out.stream_position()?;
        out.write_u32::<LittleEndian>(index.dict.len() as u32)?;
        for entry in &index.dict {
            if entry.term.len() > MAX_TERM_BYTES {
                return Err(Error::Data(format!(
                    "term too long ({} bytes): {}",
                    entry.term.len(),
                    entry.term
                )));
            }
            out.write_u16::<LittleEndian>(entry.term.len() as u16)?;
            out.write_all(entry.term.as_bytes())?;
            out.write_u32::<LittleEndian>(entry.df)?;
            out.write_u64::<LittleEndian>(entry.postings_off)?;
        }
        push_section(&mut sections, SECTION_DICT, start, out.stream_position()?);
    }

    // POSTINGS
    {
        let start = out.stream_position()?;
        for &doc in &index.postings {
            out.write_u32::<LittleEndian>(doc)?;
        }
        push_section(
            &mut sections,
            SECTION_POSTINGS,
            start,
            out.stream_position()?,
        );
    }

    // FORWARD
    {
        let start = out.stream_position()?;
        out.write_u32::<LittleEndian>(index.meta.docs_count)?;
        for doc in &index.docs {
            out.write_u32::<LittleEndian>(doc.url.len() as u32)?;
            out.write_all(doc.url.as_bytes())?;
            out.write_u32::<LittleEndian>(doc.title.len() as u32)?;
            out.write_all(doc.title.as_bytes())?;
        }
        push_section(
            &mut sections,
            SECTION_FORWARD,
            start,
            out.stream_position()?,
        );
    }

    let table_off = out.stream_position()?;
    for section in &sections {
        out.write_u32::<LittleEndian>(section.kind)?;
        out.write_u32::<LittleEndian>(section.flags)?;
        out.write_u64::<LittleEndian>(section.offset)?;
        out.write_u64::<LittleEndian>(section.size)?;
    }

    out.seek(SeekFrom::Start(8))?;
    out.write_u32::<LittleEndian>(sections.len() as u32)?;
    out.write_u64::<LittleEndian>(table_off)?;
    out.flush()?;
    Ok(())
}

fn push_section(sections: &mut Vec<SectionInfo>, kind: u32, start: u64, end: u64) {
    sections.push(SectionInfo {
        kind,
        flags: 0,
        offset: start,
        size: end - start,
    });
}

fn find_section(sections: &[SectionInfo], kind: u32) -> Option<SectionInfo> {
    sections.iter().copied().find(|s| s.kind == kind)
}

/// Load and validate an index file into memory.
///
/// Validation covers the magic and version, presence of all four sections,
/// postings alignment, forward/META doc count agreement, strict dictionary
/// ordering, and every entry's postings slice being aligned and in range.
pub fn load_index(path: &Path) -> Result<Index> {
    let mut input = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::Format("bad magic, expected IRIX".into()));
    }
    let version = input.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(Error::Format(format!(
            "unsupported version {version} (expected {VERSION})"
        )));
    }
    let section_count = input.read_u32::<LittleEndian>()?;
    let table_off = input.read_u64::<LittleEndian>()?;

    input.seek(SeekFrom::Start(table_off))?;
    let mut sections = Vec::with_capacity(section_count as usize);
    for _ in 0..section_count {
        sections.push(SectionInfo {
            kind: input.read_u32::<LittleEndian>()?,
            flags: input.read_u32::<LittleEndian>()?,
            offset: input.read_u64::<LittleEndian>()?,
            size: input.read_u64::<LittleEndian>()?,
        });
    }

    let meta_s = find_section(&sections, SECTION_META)
        .ok_or_else(|| Error::Format("META section (type=4) not found".into()))?;
    let dict_s = find_section(&sections, SECTION_DICT)
        .ok_or_else(|| Error::Format("DICT section (type=1) not found".into()))?;
    let post_s = find_section(&sections, SECTION_POSTINGS)
        .ok_or_else(|| Error::Format("POSTINGS section (type=2) not found".into()))?;
    let fwd_s = find_section(&sections, SECTION_FORWARD)
        .ok_or_else(|| Error::Format("FORWARD section (type=3) not found".into()))?;

    input.seek(SeekFrom::Start(meta_s.offset))?;
    let meta = IndexMeta {
        docs_count: input.read_u32::<LittleEndian>()?,
        total_tokens: input.read_u64::<LittleEndian>()?,
        unique_terms: input.read_u32::<LittleEndian>()?,
        avg_term_len: input.read_f64::<LittleEndian>()?,
        build_ms: input.read_f64::<LittleEndian>()?,
    };

    input.seek(SeekFrom::Start(dict_s.offset))?;
    let term_count = input.read_u32::<LittleEndian>()?;
    let mut dict = Vec::with_capacity(term_count as usize);
    for _ in 0..term_count {
        let len = input.read_u16::<LittleEndian>()?;
        let mut buf = vec![0u8; usize::from(len)];
        input.read_exact(&mut buf)?;
        let term = String::from_utf8(buf)
            .map_err(|_| Error::Format("dictionary term is not valid UTF-8".into()))?;
        let df = input.read_u32::<LittleEndian>()?;
        let postings_off = input.read_u64::<LittleEndian>()?;
        dict.push(DictEntry {
            term,
            df,
            postings_off,
        });
    }

    if post_s.size % 4 != 0 {
        return Err(Error::Format(
            "POSTINGS size is not a multiple of 4".into(),
        ));
    }
    input.seek(SeekFrom::Start(post_s.offset))?;
    let n = post_s.size / 4;
    let mut postings = Vec::with_capacity(n as usize);
    for _ in 0..n {
        postings.push(input.read_u32::<LittleEndian>()?);
    }

    input.seek(SeekFrom::Start(fwd_s.offset))?;
    let fwd_count = input.read_u32::<LittleEndian>()?;
    if fwd_count != meta.docs_count {
        return Err(Error::Format(format!(
            "FORWARD docs_count {fwd_count} differs from META docs_count {}",
            meta.docs_count
        )));
    }
    let mut docs = Vec::with_capacity(fwd_count as usize);
    for _ in 0..fwd_count {
        let url_len = input.read_u32::<LittleEndian>()?;
        let mut url = vec![0u8; url_len as usize];
        input.read_exact(&mut url)?;
        let title_len = input.read_u32::<LittleEndian>()?;
        let mut title = vec![0u8; title_len as usize];
        input.read_exact(&mut title)?;
        docs.push(DocInfo {
            url: String::from_utf8_lossy(&url).into_owned(),
            title: String::from_utf8_lossy(&title).into_owned(),
        });
    }

    for pair in dict.windows(2) {
        if pair[0].term >= pair[1].term {
            return Err(Error::Format(
                "dictionary is not strictly sorted by term".into(),
            ));
        }
    }
    for entry in &dict {
        if entry.postings_off % 4 != 0 {
            return Err(Error::Format(format!(
                "postings_off {} of term {} is not aligned",
                entry.postings_off, entry.term
            )));
        }
        let start = entry.postings_off / 4;
        if start + u64::from(entry.df) > postings.len() as u64 {
            return Err(Error::Format(format!(
                "postings range of term {} is out of bounds",
                entry.term
            )));
        }
    }

    Ok(Index {
        meta,
        dict,
        postings,
        docs,
    })
}
