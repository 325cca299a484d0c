use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::Object::*;
use super::{Dictionary, Document, Error, Object, ObjectId, Result, Stream, StringFormat};
use crate::encryption::encrypt_object;

impl Document {
    /// Save PDF document to specified file path.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<File> {
        let mut file = BufWriter::new(File::create(path)?);
        self.save_internal(&mut file)?;
        Ok(file.into_inner().map_err(|err| err.into_error())?)
    }

    /// Save PDF to arbitrary target
    #[inline]
    pub fn save_to<W: Write>(&self, target: &mut W) -> Result<()> {
        self.save_internal(target)
    }

    fn save_internal<W: Write>(&self, target: &mut W) -> Result<()> {
        let last_id = self.objects.keys().next_back().map_or(0, |&(id, _)| id).max(self.max_id);
        let size = last_id.checked_add(1).ok_or(Error::ObjectNumberOverflow(last_id))?;

        // Every object is encrypted before the first byte is written, so a failure leaves no
        // partially protected output behind.
        let objects = self.prepare_objects()?;

        let mut target = CountingWrite {
            inner: target,
            bytes_written: 0,
        };
        let mut xref = Xref::new(size);

        writeln!(target, "%PDF-{}", self.version)?;
        // Binary marker, as encrypted strings and streams are not text.
        target.write_all(b"%\xE2\xE3\xCF\xD3\n")?;

        for ((id, generation), object) in &objects {
            Writer::write_indirect_object(&mut target, *id, *generation, object, &mut xref)?;
        }

        let xref_start = target.bytes_written;
        Writer::write_xref(&mut target, &xref)?;
        self.write_trailer(&mut target, xref.size)?;
        write!(target, "\nstartxref\n{xref_start}\n%%EOF")?;

        Ok(())
    }

    /// The objects as they are written: strings and streams encrypted when the document has a
    /// security handler, the encryption dictionary itself excepted.
    fn prepare_objects(&self) -> Result<Vec<(ObjectId, Cow<'_, Object>)>> {
        #[cfg(feature = "rayon")]
        let objects = self
            .objects
            .par_iter()
            .map(|(&id, object)| self.prepare_object(id, object).map(|object| (id, object)))
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "rayon"))]
        let objects = self
            .objects
            .iter()
            .map(|(&id, object)| self.prepare_object(id, object).map(|object| (id, object)))
            .collect::<Result<Vec<_>>>()?;

        if self.encryption.is_some() {
            log::debug!("encrypted {} objects", objects.len().saturating_sub(1));
        }

        Ok(objects)
    }

    fn prepare_object<'a>(&self, id: ObjectId, object: &'a Object) -> Result<Cow<'a, Object>> {
        match &self.encryption {
            // Keys are derived for generation 0, so any other generation would be unreadable.
            Some(_) if id.1 != 0 => Err(Error::UnsupportedGeneration(id)),
            Some((dict_id, handler)) if *dict_id != id => {
                let mut object = object.clone();
                encrypt_object(handler, id.0, &mut object)?;
                Ok(Cow::Owned(object))
            }
            _ => Ok(Cow::Borrowed(object)),
        }
    }

    fn write_trailer(&self, file: &mut dyn Write, size: u32) -> Result<()> {
        let mut trailer = self.trailer.clone();
        trailer.set("Size", i64::from(size));
        file.write_all(b"trailer\n")?;
        Writer::write_dictionary(file, &trailer)?;
        Ok(())
    }
}

/// Byte offsets of the indirect objects, indexed by object number.
struct Xref {
    entries: BTreeMap<u32, (usize, u16)>,
    size: u32,
}

impl Xref {
    fn new(size: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            size,
        }
    }

    fn insert(&mut self, id: u32, offset: usize, generation: u16) {
        self.entries.insert(id, (offset, generation));
    }
}

pub struct Writer;

impl Writer {
    fn need_separator(object: &Object) -> bool {
        matches!(*object, Null | Boolean(_) | Integer(_) | Real(_) | Reference(_))
    }

    fn need_end_separator(object: &Object) -> bool {
        matches!(
            *object,
            Null | Boolean(_) | Integer(_) | Real(_) | Name(_) | Reference(_) | Object::Stream(_)
        )
    }

    fn write_xref(file: &mut dyn Write, xref: &Xref) -> Result<()> {
        writeln!(file, "xref\n0 {}", xref.size)?;

        let mut write_xref_entry =
            |offset: usize, generation: u16, kind: char| writeln!(file, "{offset:>010} {generation:>05} {kind} ");
        write_xref_entry(0, 65535, 'f')?;

        for obj_id in 1..xref.size {
            match xref.entries.get(&obj_id) {
                Some(&(offset, generation)) => write_xref_entry(offset, generation, 'n')?,
                None => write_xref_entry(0, 65535, 'f')?,
            }
        }
        Ok(())
    }

    fn write_indirect_object<W: Write>(
        file: &mut CountingWrite<&mut W>, id: u32, generation: u16, object: &Object, xref: &mut Xref,
    ) -> Result<()> {
        xref.insert(id, file.bytes_written, generation);
        write!(
            file,
            "{} {} obj{}",
            id,
            generation,
            if Writer::need_separator(object) { " " } else { "" }
        )?;
        Writer::write_object(file, object)?;
        writeln!(
            file,
            "{}endobj",
            if Writer::need_end_separator(object) { " " } else { "" }
        )?;
        Ok(())
    }

    pub fn write_object(file: &mut dyn Write, object: &Object) -> Result<()> {
        match object {
            Null => file.write_all(b"null")?,
            Boolean(true) => file.write_all(b"true")?,
            Boolean(false) => file.write_all(b"false")?,
            Integer(value) => {
                let mut buf = itoa::Buffer::new();
                file.write_all(buf.format(*value).as_bytes())?;
            }
            Real(value) => file.write_all(format!("{:.02?}", *value).as_bytes())?,
            Name(name) => Writer::write_name(file, name)?,
            String(text, format) => Writer::write_string(file, text, format)?,
            Array(array) => Writer::write_array(file, array)?,
            Object::Dictionary(dict) => Writer::write_dictionary(file, dict)?,
            Object::Stream(stream) => Writer::write_stream(file, stream)?,
            Reference(id) => write!(file, "{} {} R", id.0, id.1)?,
        }
        Ok(())
    }

    fn write_name(file: &mut dyn Write, name: &[u8]) -> Result<()> {
        file.write_all(b"/")?;
        for &byte in name {
            // white-space and delimiter chars are encoded to # sequences
            // also encode bytes outside of the range 33 (!) to 126 (~)
            if b" \t\n\r\x0C()<>[]{}/%#".contains(&byte) || !(33..=126).contains(&byte) {
                write!(file, "#{byte:02X}")?;
            } else {
                file.write_all(&[byte])?;
            }
        }
        Ok(())
    }

    fn write_string(file: &mut dyn Write, text: &[u8], format: &StringFormat) -> Result<()> {
        match *format {
            // Within a literal string, backslash and unbalanced parentheses are escaped. An
            // unescaped end-of-line marker reads as \n, so \r is escaped too.
            StringFormat::Literal => {
                let mut escape_indices = Vec::new();
                let mut parentheses = Vec::new();
                for (index, &byte) in text.iter().enumerate() {
                    match byte {
                        b'(' => parentheses.push(index),
                        b')' => {
                            if parentheses.pop().is_none() {
                                escape_indices.push(index);
                            }
                        }
                        b'\\' | b'\r' => escape_indices.push(index),
                        _ => continue,
                    }
                }
                escape_indices.append(&mut parentheses);

                file.write_all(b"(")?;
                if escape_indices.is_empty() {
                    file.write_all(text)?;
                } else {
                    for (index, &byte) in text.iter().enumerate() {
                        if escape_indices.contains(&index) {
                            file.write_all(b"\\")?;
                            file.write_all(&[if byte == b'\r' { b'r' } else { byte }])?;
                        } else {
                            file.write_all(&[byte])?;
                        }
                    }
                }
                file.write_all(b")")?;
            }
            StringFormat::Hexadecimal => {
                file.write_all(b"<")?;
                for &byte in text {
                    write!(file, "{byte:02X}")?;
                }
                file.write_all(b">")?;
            }
        }
        Ok(())
    }

    fn write_array(file: &mut dyn Write, array: &[Object]) -> Result<()> {
        file.write_all(b"[")?;
        let mut first = true;
        for object in array {
            if first {
                first = false;
            } else if Writer::need_separator(object) {
                file.write_all(b" ")?;
            }
            Writer::write_object(file, object)?;
        }
        file.write_all(b"]")?;
        Ok(())
    }

    fn write_dictionary(file: &mut dyn Write, dictionary: &Dictionary) -> Result<()> {
        file.write_all(b"<<")?;
        for (key, value) in dictionary {
            Writer::write_name(file, key)?;
            if Writer::need_separator(value) {
                file.write_all(b" ")?;
            }
            Writer::write_object(file, value)?;
        }
        file.write_all(b">>")?;
        Ok(())
    }

    fn write_stream(file: &mut dyn Write, stream: &Stream) -> Result<()> {
        Writer::write_dictionary(file, &stream.dict)?;
        file.write_all(b"stream\n")?;
        file.write_all(&stream.content)?;
        file.write_all(b"\nendstream")?;
        Ok(())
    }
}

pub struct CountingWrite<W: Write> {
    inner: W,
    bytes_written: usize,
}

impl<W: Write> Write for CountingWrite<W> {
    #[inline]
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let result = self.inner.write(buffer);
        if let Ok(bytes) = result {
            self.bytes_written += bytes;
        }
        result
    }

    #[inline]
    fn write_all(&mut self, buffer: &[u8]) -> std::io::Result<()> {
        self.bytes_written += buffer.len();
        // If this returns `Err` we can't know how many bytes were actually written (if any)
        // but that doesn't matter since we're gonna abort the entire PDF generation anyway.
        self.inner.write_all(buffer)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{CryptAlgorithm, DocumentId, EncryptionConfiguration, OsRandom, Permissions};
    use crate::dictionary;
    use std::sync::Arc;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|window| window == needle)
    }

    fn written(doc: &Document) -> Vec<u8> {
        let mut output = Vec::new();
        doc.save_to(&mut output).unwrap();
        output
    }

    /// Checks that startxref and every in-use xref entry point at what they claim to.
    fn assert_offsets_are_consistent(output: &[u8]) {
        let startxref = find(output, b"startxref\n").unwrap() + b"startxref\n".len();
        let end = find(&output[startxref..], b"\n").unwrap();
        let xref_start: usize = std::str::from_utf8(&output[startxref..startxref + end]).unwrap().parse().unwrap();
        assert!(output[xref_start..].starts_with(b"xref\n0 "));

        let table = std::str::from_utf8(&output[xref_start..]).unwrap_or_default();
        for (id, line) in table.lines().skip(2).take_while(|line| line.len() == 19).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            if line.ends_with("n ") {
                let header = format!("{} 0 obj", id);
                assert!(output[offset..].starts_with(header.as_bytes()), "object {id}");
            }
        }
    }

    #[test]
    fn save_document() {
        let mut doc = Document::with_version("1.5");
        doc.objects.insert((1, 0), Null);
        doc.objects.insert((2, 0), Boolean(true));
        doc.objects.insert((3, 0), Integer(3));
        doc.objects.insert((4, 0), Real(0.5));
        doc.objects.insert((5, 0), String(b"text((\r)".to_vec(), StringFormat::Literal));
        doc.objects.insert((6, 0), String(b"text((\r)".to_vec(), StringFormat::Hexadecimal));
        doc.objects.insert((7, 0), Name(b"name \t".to_vec()));
        doc.objects.insert((8, 0), Reference((1, 0)));
        doc.objects.insert((9, 0), Array(vec![Integer(1), Integer(2), Integer(3)]));
        doc.objects.insert((11, 0), Object::Stream(Stream::new(Dictionary::new(), vec![0x41, 0x42, 0x43])));
        let mut dict = Dictionary::new();
        dict.set("A", Null);
        dict.set("B", false);
        dict.set("C", Name(b"name".to_vec()));
        doc.objects.insert((12, 0), Object::Dictionary(dict));
        doc.max_id = 12;

        let output = written(&doc);

        assert!(output.starts_with(b"%PDF-1.5\n"));
        assert!(output.ends_with(b"%%EOF"));
        assert!(find(&output, b"5 0 obj(text\\((\\r))endobj").is_some());
        assert!(find(&output, b"6 0 obj<7465787428280D29>endobj").is_some());
        assert!(find(&output, b"7 0 obj/name#20#09 endobj").is_some());
        assert!(find(&output, b"9 0 obj[1 2 3]endobj").is_some());
        assert!(find(&output, b"11 0 obj<</Length 3>>stream\nABC\nendstream endobj").is_some());
        assert!(find(&output, b"12 0 obj<</A null/B false/C/name>>endobj").is_some());
        assert!(find(&output, b"trailer\n<</Size 13>>").is_some());
        // Object 0 and the unused object 10 are free.
        assert_eq!(output.windows(7).filter(|window| window == b"65535 f").count(), 2);
        assert_offsets_are_consistent(&output);
    }

    #[test]
    fn strings_and_streams_are_written_encrypted() {
        let mut doc = Document::new();
        let info = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly report"),
        });
        doc.add_object(Stream::new(dictionary! {}, b"BT (Confidential) Tj ET".to_vec()));
        doc.trailer.set("Info", info);

        let config = EncryptionConfiguration::new(CryptAlgorithm::Aes128, "user")
            .with_owner_password("owner")
            .with_permissions(Permissions::PRINTABLE | Permissions::COPYABLE);
        doc.encrypt_with(&config, DocumentId::from_bytes([0x11; 16]), Arc::new(OsRandom))
            .unwrap();

        let output = written(&doc);

        assert!(find(&output, b"Quarterly report").is_none());
        assert!(find(&output, b"Confidential").is_none());
        assert!(find(&output, b"/Length 48").is_some());

        // The encryption dictionary and the identifier are stored in clear.
        let handler = doc.security_handler().unwrap();
        let owner_value: std::string::String = handler.owner_value().iter().map(|b| format!("{b:02X}")).collect();
        assert!(find(&output, format!("/O<{owner_value}>").as_bytes()).is_some());
        assert!(find(&output, b"/CFM/AESV2").is_some());
        assert!(find(&output, b"/Encrypt 3 0 R").is_some());
        assert!(find(&output, format!("/ID[<{}><{}>]", "11".repeat(16), "11".repeat(16)).as_bytes()).is_some());

        // Saving never changes the objects held by the document.
        let title = doc.get_object(info).unwrap().as_dict().unwrap().get(b"Title").unwrap();
        assert_eq!(title.as_str().unwrap(), b"Quarterly report");

        assert_offsets_are_consistent(&output);
    }

    #[test]
    fn saves_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.pdf");

        let mut doc = Document::new();
        doc.add_object(Object::string_literal("hello"));
        doc.save(&path).unwrap();

        let output = std::fs::read(&path).unwrap();
        assert!(output.starts_with(b"%PDF-1.7\n"));
        assert!(find(&output, b"1 0 obj(hello)endobj").is_some());
    }

    #[test]
    fn encrypted_objects_must_be_generation_zero() {
        let mut doc = Document::new();
        doc.objects.insert((2, 1), Object::string_literal("updated"));
        doc.max_id = 2;

        let config = EncryptionConfiguration::new(CryptAlgorithm::Rc4, "user");
        doc.encrypt_with(&config, DocumentId::from_bytes([0x22; 16]), Arc::new(OsRandom))
            .unwrap();

        let mut output = Vec::new();
        assert!(matches!(
            doc.save_to(&mut output),
            Err(Error::UnsupportedGeneration((2, 1)))
        ));
        assert!(output.is_empty());

        // Without encryption the generation is written as given.
        let mut doc = Document::new();
        doc.objects.insert((2, 1), Object::string_literal("updated"));
        doc.max_id = 2;

        let output = written(&doc);
        assert!(find(&output, b"2 1 obj(updated)endobj").is_some());
        assert!(find(&output, b" 00001 n ").is_some());
    }

    #[test]
    fn last_object_number_is_rejected() {
        let mut doc = Document::new();
        doc.objects.insert((u32::MAX, 0), Null);

        let mut output = Vec::new();
        assert!(matches!(
            doc.save_to(&mut output),
            Err(Error::ObjectNumberOverflow(u32::MAX))
        ));
        assert!(output.is_empty());
    }

    #[test]
    fn size_covers_objects_beyond_max_id() {
        let mut doc = Document::new();
        doc.objects.insert((4, 0), Integer(4));

        let output = written(&doc);
        assert!(find(&output, b"trailer\n<</Size 5>>").is_some());
        assert_offsets_are_consistent(&output);
    }
}
