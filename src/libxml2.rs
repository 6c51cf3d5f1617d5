//! LibXML2 FFI wrapper
//!
//! Safe wrappers around the libxml2 calls this tool needs: document
//! parsing (optionally DTD-validating), XML Schema and RELAX NG
//! validation, and the external entity loader hook that routes every
//! DTD and entity fetch through a catalog resolver.
//!
//! No mature pure-Rust library covers DTD or XSD validation, so the
//! heavy lifting stays in libxml2 behind RAII pointer wrappers. The
//! parser is single-threaded here; error capture uses libxml2's global
//! structured error handler, which is safe because only one parse runs
//! at a time.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};

use libc::{c_char, c_int, c_void};
use tracing::trace;

use crate::error::{LibXml2Error, LibXml2Result};

/// libxml2's init functions are not thread-safe; run them exactly once.
static LIBXML2_INIT: Once = Once::new();

// xmlReadFile option flags (xmlParserOption)
pub const XML_PARSE_NOENT: c_int = 1 << 1;
pub const XML_PARSE_DTDLOAD: c_int = 1 << 2;
pub const XML_PARSE_DTDATTR: c_int = 1 << 3;
pub const XML_PARSE_DTDVALID: c_int = 1 << 4;
pub const XML_PARSE_NONET: c_int = 1 << 11;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNG {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNGParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNGValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInput {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlExternalEntityLoader = unsafe extern "C" fn(
    url: *const c_char,
    id: *const c_char,
    ctxt: *mut XmlParserCtxt,
) -> *mut XmlParserInput;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    pub fn xmlReadFile(
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // External entity loader hook
    pub fn xmlGetExternalEntityLoader() -> XmlExternalEntityLoader;
    pub fn xmlSetExternalEntityLoader(loader: XmlExternalEntityLoader);
    pub fn xmlNewInputFromFile(
        ctxt: *mut XmlParserCtxt,
        filename: *const c_char,
    ) -> *mut XmlParserInput;

    // XML Schema
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // RELAX NG
    pub fn xmlRelaxNGNewParserCtxt(url: *const c_char) -> *mut XmlRelaxNGParserCtxt;
    pub fn xmlRelaxNGParse(ctxt: *mut XmlRelaxNGParserCtxt) -> *mut XmlRelaxNG;
    pub fn xmlRelaxNGFreeParserCtxt(ctxt: *mut XmlRelaxNGParserCtxt);
    pub fn xmlRelaxNGFree(grammar: *mut XmlRelaxNG);
    pub fn xmlRelaxNGNewValidCtxt(grammar: *mut XmlRelaxNG) -> *mut XmlRelaxNGValidCtxt;
    pub fn xmlRelaxNGFreeValidCtxt(ctxt: *mut XmlRelaxNGValidCtxt);
    pub fn xmlRelaxNGValidateDoc(ctxt: *mut XmlRelaxNGValidCtxt, doc: *mut XmlDoc) -> c_int;
    pub fn xmlRelaxNGSetValidStructuredErrors(
        ctxt: *mut XmlRelaxNGValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
}

/// A diagnostic captured from libxml2's structured error channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    pub message: String,
    pub level: i32,
    pub line: i32,
}

impl CapturedError {
    /// Errors and fatal errors (levels 2 and 3); warnings are level 1
    pub fn is_serious(&self) -> bool {
        self.level >= 2
    }
}

/// Callback for libxml2 to report errors into a Vec<CapturedError>
unsafe extern "C" fn capture_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let errors = unsafe { &mut *(user_data as *mut Vec<CapturedError>) };
    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return;
    }
    let c_str = unsafe { CStr::from_ptr(msg_ptr) };
    if let Ok(s) = c_str.to_str() {
        errors.push(CapturedError {
            message: s.trim().to_string(),
            level: unsafe { (*error).level },
            line: unsafe { (*error).line },
        });
    }
}

/// Run `f` with libxml2's global error handler capturing diagnostics.
/// Only safe because parsing is single-threaded in this application.
fn with_captured_errors<T>(f: impl FnOnce() -> T) -> (T, Vec<CapturedError>) {
    let mut errors: Vec<CapturedError> = Vec::new();
    unsafe {
        xmlSetStructuredErrorFunc(
            &mut errors as *mut Vec<CapturedError> as *mut c_void,
            Some(capture_error_callback),
        );
    }
    let out = f();
    unsafe {
        xmlSetStructuredErrorFunc(std::ptr::null_mut(), None);
    }
    (out, errors)
}

fn path_to_cstring(path: &Path) -> LibXml2Result<CString> {
    let s = path.to_str().ok_or_else(|| LibXml2Error::InvalidPath {
        path: path.to_path_buf(),
    })?;
    CString::new(s).map_err(|_| LibXml2Error::InvalidPath {
        path: path.to_path_buf(),
    })
}

/// Owned libxml2 document
#[derive(Debug)]
pub struct XmlDocPtr {
    ptr: *mut XmlDoc,
    _phantom: PhantomData<XmlDoc>,
}

// Safety: the document is only read after parsing completes
unsafe impl Send for XmlDocPtr {}

impl XmlDocPtr {
    /// Wrap a document produced by libxml2/libxslt. Returns None for null.
    ///
    /// # Safety
    ///
    /// The pointer must own its document; it will be freed with xmlFreeDoc.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlDoc) -> Option<Self> {
        (!ptr.is_null()).then(|| XmlDocPtr {
            ptr,
            _phantom: PhantomData,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut XmlDoc {
        self.ptr
    }
}

impl Drop for XmlDocPtr {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Shared, parsed XML Schema
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: xmlSchema structures are read-only after parsing
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlSchemaFree(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Shared, parsed RELAX NG grammar
#[derive(Debug, Clone)]
pub struct RelaxNgPtr {
    inner: Arc<RelaxNgInner>,
}

#[derive(Debug)]
struct RelaxNgInner {
    ptr: *mut XmlRelaxNG,
    _phantom: PhantomData<XmlRelaxNG>,
}

unsafe impl Send for RelaxNgInner {}
unsafe impl Sync for RelaxNgInner {}

impl RelaxNgPtr {
    pub(crate) fn as_ptr(&self) -> *mut XmlRelaxNG {
        self.inner.ptr
    }
}

impl Drop for RelaxNgInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlRelaxNGFree(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// A parsed document together with everything libxml2 reported about it
#[derive(Debug)]
pub struct ParsedDocument {
    pub doc: XmlDocPtr,
    pub diagnostics: Vec<CapturedError>,
}

impl ParsedDocument {
    /// True when the parse reported errors (not mere warnings)
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(CapturedError::is_serious)
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_serious())
            .map(|d| d.message.clone())
            .collect()
    }
}

/// Validation outcome from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid { errors: Vec<String> },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Maps external entity references (DTDs, parameter entities) to local
/// files during a parse. Implemented by the catalog resolver.
pub trait EntityResolver: Send + Sync {
    fn resolve_entity(&self, url: Option<&str>, id: Option<&str>) -> Option<PathBuf>;
}

static DEFAULT_LOADER: OnceLock<XmlExternalEntityLoader> = OnceLock::new();
static ACTIVE_RESOLVER: Mutex<Option<Arc<dyn EntityResolver>>> = Mutex::new(None);

/// Entity loader installed over libxml2's default. Consults the active
/// resolver first, then falls back to the captured default loader.
unsafe extern "C" fn resolving_entity_loader(
    url: *const c_char,
    id: *const c_char,
    ctxt: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    let url_str = (!url.is_null())
        .then(|| unsafe { CStr::from_ptr(url) }.to_string_lossy().into_owned());
    let id_str =
        (!id.is_null()).then(|| unsafe { CStr::from_ptr(id) }.to_string_lossy().into_owned());

    // Clone the Arc and release the lock before resolving; resolution may
    // trigger a download and must not hold the registry lock.
    let resolver = ACTIVE_RESOLVER
        .lock()
        .ok()
        .and_then(|guard| guard.clone());

    if let Some(resolver) = resolver {
        if let Some(path) = resolver.resolve_entity(url_str.as_deref(), id_str.as_deref()) {
            trace!(url = ?url_str, id = ?id_str, path = %path.display(), "entity resolved");
            if let Ok(c_path) = CString::new(path.to_string_lossy().as_ref()) {
                let input = unsafe { xmlNewInputFromFile(ctxt, c_path.as_ptr()) };
                if !input.is_null() {
                    return input;
                }
            }
        }
    }

    match DEFAULT_LOADER.get() {
        Some(default) => unsafe { default(url, id, ctxt) },
        None => std::ptr::null_mut(),
    }
}

/// Route all external entity loading through `resolver` until cleared
pub fn install_entity_resolver(resolver: Arc<dyn EntityResolver>) {
    init();
    DEFAULT_LOADER.get_or_init(|| unsafe { xmlGetExternalEntityLoader() });
    unsafe { xmlSetExternalEntityLoader(resolving_entity_loader) };
    *ACTIVE_RESOLVER
        .lock()
        .expect("entity resolver lock poisoned") = Some(resolver);
}

pub fn clear_entity_resolver() {
    *ACTIVE_RESOLVER
        .lock()
        .expect("entity resolver lock poisoned") = None;
}

fn init() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
    });
}

/// Safe entry points into libxml2
pub struct LibXml2;

impl LibXml2 {
    pub fn new() -> Self {
        init();
        LibXml2
    }

    /// Parse a document from a file. Entity substitution and DTD loading
    /// are always on so the resolver sees every external reference;
    /// `validate_dtd` additionally runs the DTD validator during the
    /// parse. Network access from inside libxml2 stays off; remote
    /// fetches go through the resolver instead.
    pub fn read_file(&self, path: &Path, validate_dtd: bool) -> LibXml2Result<ParsedDocument> {
        let c_path = path_to_cstring(path)?;
        let mut options =
            XML_PARSE_NOENT | XML_PARSE_DTDLOAD | XML_PARSE_DTDATTR | XML_PARSE_NONET;
        if validate_dtd {
            options |= XML_PARSE_DTDVALID;
        }

        let (doc_ptr, diagnostics) = with_captured_errors(|| unsafe {
            xmlReadFile(c_path.as_ptr(), std::ptr::null(), options)
        });

        if doc_ptr.is_null() {
            let details = diagnostics
                .iter()
                .filter(|d| d.is_serious())
                .map(|d| d.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LibXml2Error::ReadFailed {
                file: path.to_path_buf(),
                details: if details.is_empty() {
                    "parse failed".to_string()
                } else {
                    details
                },
            });
        }

        Ok(ParsedDocument {
            doc: XmlDocPtr {
                ptr: doc_ptr,
                _phantom: PhantomData,
            },
            diagnostics,
        })
    }

    /// Parse an XML Schema from a file
    pub fn parse_schema_file(&self, path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path_to_cstring(path)?;

        let (schema_ptr, _diagnostics) = with_captured_errors(|| unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return std::ptr::null_mut();
            }
            let schema = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);
            schema
        });

        if schema_ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed {
                uri: path.display().to_string(),
            });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr: schema_ptr,
                _phantom: PhantomData,
            }),
        })
    }

    /// Parse a RELAX NG grammar from a file (XML syntax only)
    pub fn parse_relaxng_file(&self, path: &Path) -> LibXml2Result<RelaxNgPtr> {
        let c_path = path_to_cstring(path)?;

        let (grammar_ptr, _diagnostics) = with_captured_errors(|| unsafe {
            let parser_ctxt = xmlRelaxNGNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return std::ptr::null_mut();
            }
            let grammar = xmlRelaxNGParse(parser_ctxt);
            xmlRelaxNGFreeParserCtxt(parser_ctxt);
            grammar
        });

        if grammar_ptr.is_null() {
            return Err(LibXml2Error::GrammarParseFailed {
                uri: path.display().to_string(),
            });
        }

        Ok(RelaxNgPtr {
            inner: Arc::new(RelaxNgInner {
                ptr: grammar_ptr,
                _phantom: PhantomData,
            }),
        })
    }

    /// Validate a parsed document against an XML Schema
    pub fn validate_with_schema(
        &self,
        schema: &XmlSchemaPtr,
        document: &ParsedDocument,
    ) -> LibXml2Result<ValidationResult> {
        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut errors: Vec<CapturedError> = Vec::new();
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(capture_error_callback),
                &mut errors as *mut Vec<CapturedError> as *mut c_void,
            );

            let code = xmlSchemaValidateDoc(valid_ctxt, document.doc.as_ptr());
            xmlSchemaFreeValidCtxt(valid_ctxt);

            match code {
                0 => Ok(ValidationResult::Valid),
                n if n > 0 => Ok(ValidationResult::Invalid {
                    errors: errors.into_iter().map(|e| e.message).collect(),
                }),
                n => Err(LibXml2Error::InternalError { code: n }),
            }
        }
    }

    /// Validate a parsed document against a RELAX NG grammar
    pub fn validate_with_relaxng(
        &self,
        grammar: &RelaxNgPtr,
        document: &ParsedDocument,
    ) -> LibXml2Result<ValidationResult> {
        unsafe {
            let valid_ctxt = xmlRelaxNGNewValidCtxt(grammar.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut errors: Vec<CapturedError> = Vec::new();
            xmlRelaxNGSetValidStructuredErrors(
                valid_ctxt,
                Some(capture_error_callback),
                &mut errors as *mut Vec<CapturedError> as *mut c_void,
            );

            let code = xmlRelaxNGValidateDoc(valid_ctxt, document.doc.as_ptr());
            xmlRelaxNGFreeValidCtxt(valid_ctxt);

            match code {
                0 => Ok(ValidationResult::Valid),
                n if n > 0 => Ok(ValidationResult::Invalid {
                    errors: errors.into_iter().map(|e| e.message).collect(),
                }),
                n => Err(LibXml2Error::InternalError { code: n }),
            }
        }
    }
}

impl Default for LibXml2 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    const SIMPLE_RNG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<element name="root" xmlns="http://relaxng.org/ns/structure/1.0">
    <text/>
</element>"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_well_formed_document() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "doc.xml", "<root>Hello</root>");

        let xml = LibXml2::new();
        let parsed = xml.read_file(&doc, false).unwrap();
        assert!(!parsed.has_errors());
    }

    #[test]
    fn test_read_malformed_document_fails() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "bad.xml", "<root><unclosed></root>");

        let xml = LibXml2::new();
        let result = xml.read_file(&doc, false);
        assert!(matches!(result, Err(LibXml2Error::ReadFailed { .. })));
    }

    #[test]
    fn test_dtd_validating_parse_reports_invalidity() {
        let dir = TempDir::new().unwrap();
        let doc = write(
            &dir,
            "doc.xml",
            r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (child)>
  <!ELEMENT child (#PCDATA)>
]>
<root>no child element here</root>"#,
        );

        let xml = LibXml2::new();
        let parsed = xml.read_file(&doc, true).unwrap();
        assert!(parsed.has_errors());
        assert!(!parsed.error_messages().is_empty());
    }

    #[test]
    fn test_dtd_validating_parse_of_valid_document() {
        let dir = TempDir::new().unwrap();
        let doc = write(
            &dir,
            "doc.xml",
            r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (#PCDATA)>
]>
<root>text</root>"#,
        );

        let xml = LibXml2::new();
        let parsed = xml.read_file(&doc, true).unwrap();
        assert!(!parsed.has_errors());
    }

    #[test]
    fn test_schema_validation() {
        let dir = TempDir::new().unwrap();
        let schema_path = write(&dir, "schema.xsd", SIMPLE_XSD);
        let valid_doc = write(&dir, "valid.xml", "<root>Hello</root>");
        let invalid_doc = write(&dir, "invalid.xml", "<root><nested/></root>");

        let xml = LibXml2::new();
        let schema = xml.parse_schema_file(&schema_path).unwrap();

        let parsed = xml.read_file(&valid_doc, false).unwrap();
        assert!(xml.validate_with_schema(&schema, &parsed).unwrap().is_valid());

        let parsed = xml.read_file(&invalid_doc, false).unwrap();
        let result = xml.validate_with_schema(&schema, &parsed).unwrap();
        assert!(matches!(result, ValidationResult::Invalid { .. }));
    }

    #[test]
    fn test_schema_parse_failure() {
        let dir = TempDir::new().unwrap();
        let bogus = write(&dir, "bogus.xsd", "<not-a-schema/>");

        let xml = LibXml2::new();
        let result = xml.parse_schema_file(&bogus);
        assert!(matches!(result, Err(LibXml2Error::SchemaParseFailed { .. })));
    }

    #[test]
    fn test_relaxng_validation() {
        let dir = TempDir::new().unwrap();
        let grammar_path = write(&dir, "grammar.rng", SIMPLE_RNG);
        let valid_doc = write(&dir, "valid.xml", "<root>Hello</root>");
        let invalid_doc = write(&dir, "invalid.xml", "<other>Hello</other>");

        let xml = LibXml2::new();
        let grammar = xml.parse_relaxng_file(&grammar_path).unwrap();

        let parsed = xml.read_file(&valid_doc, false).unwrap();
        assert!(xml
            .validate_with_relaxng(&grammar, &parsed)
            .unwrap()
            .is_valid());

        let parsed = xml.read_file(&invalid_doc, false).unwrap();
        let result = xml.validate_with_relaxng(&grammar, &parsed).unwrap();
        assert!(matches!(result, ValidationResult::Invalid { .. }));
    }

    #[test]
    fn test_schema_ptr_cloning_shares_pointer() {
        let dir = TempDir::new().unwrap();
        let schema_path = write(&dir, "schema.xsd", SIMPLE_XSD);

        let xml = LibXml2::new();
        let schema = xml.parse_schema_file(&schema_path).unwrap();
        let cloned = schema.clone();
        assert_eq!(schema.as_ptr(), cloned.as_ptr());
    }

    // The loader hook also sees the top-level document load, so the
    // redirect must be keyed on the DTD's URL rather than unconditional.
    struct FixedResolver {
        url: String,
        target: PathBuf,
    }

    impl EntityResolver for FixedResolver {
        fn resolve_entity(&self, url: Option<&str>, _id: Option<&str>) -> Option<PathBuf> {
            (url == Some(self.url.as_str())).then(|| self.target.clone())
        }
    }

    #[test]
    fn test_entity_resolver_redirects_dtd_load() {
        let dir = TempDir::new().unwrap();
        let dtd = write(&dir, "real.dtd", "<!ELEMENT root (#PCDATA)>");
        let doc = write(
            &dir,
            "doc.xml",
            r#"<?xml version="1.0"?>
<!DOCTYPE root SYSTEM "http://example.com/does-not-exist.dtd">
<root>text</root>"#,
        );

        install_entity_resolver(Arc::new(FixedResolver {
            url: "http://example.com/does-not-exist.dtd".to_string(),
            target: dtd,
        }));
        let xml = LibXml2::new();
        let parsed = xml.read_file(&doc, true).unwrap();
        clear_entity_resolver();

        assert!(!parsed.has_errors());
    }
}
