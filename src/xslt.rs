//! libxslt FFI wrapper
//!
//! Compiles XSLT 1.0 stylesheets and applies them to parsed documents.
//! Results are serialized through xsltSaveResultToFilename, which honors
//! the stylesheet's xsl:output settings; the filename "-" means stdout.

use std::ffi::CString;
use std::marker::PhantomData;
use std::path::Path;

use libc::{c_char, c_int, c_uchar};

use crate::error::{LibXml2Error, LibXml2Result};
use crate::libxml2::{ParsedDocument, XmlDoc, XmlDocPtr};

#[repr(C)]
pub struct XsltStylesheet {
    _private: [u8; 0],
}

#[cfg_attr(target_os = "windows", link(name = "libxslt"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xslt"))]
unsafe extern "C" {
    pub fn xsltParseStylesheetFile(filename: *const c_uchar) -> *mut XsltStylesheet;
    pub fn xsltFreeStylesheet(style: *mut XsltStylesheet);
    pub fn xsltApplyStylesheet(
        style: *mut XsltStylesheet,
        doc: *mut XmlDoc,
        params: *const *const c_char,
    ) -> *mut XmlDoc;
    pub fn xsltSaveResultToFilename(
        uri: *const c_char,
        result: *mut XmlDoc,
        style: *mut XsltStylesheet,
        compression: c_int,
    ) -> c_int;
}

/// A compiled stylesheet
#[derive(Debug)]
pub struct Stylesheet {
    ptr: *mut XsltStylesheet,
    _phantom: PhantomData<XsltStylesheet>,
}

// Safety: the compiled stylesheet is only read after compilation
unsafe impl Send for Stylesheet {}

impl Drop for Stylesheet {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // Frees the stylesheet document too; it was consumed at parse time
            unsafe { xsltFreeStylesheet(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Compile a stylesheet from a file. External references inside the
/// stylesheet (xsl:import, xsl:include) go through the installed entity
/// loader like any other parse.
pub fn compile_file(path: &Path) -> LibXml2Result<Stylesheet> {
    let s = path.to_str().ok_or_else(|| LibXml2Error::InvalidPath {
        path: path.to_path_buf(),
    })?;
    let c_path = CString::new(s).map_err(|_| LibXml2Error::InvalidPath {
        path: path.to_path_buf(),
    })?;

    let ptr = unsafe { xsltParseStylesheetFile(c_path.as_ptr() as *const c_uchar) };
    if ptr.is_null() {
        return Err(LibXml2Error::StylesheetParseFailed {
            uri: path.display().to_string(),
        });
    }

    Ok(Stylesheet {
        ptr,
        _phantom: PhantomData,
    })
}

impl Stylesheet {
    /// Apply the stylesheet to a parsed document
    pub fn transform(&self, document: &ParsedDocument) -> LibXml2Result<XmlDocPtr> {
        let result = unsafe {
            xsltApplyStylesheet(self.ptr, document.doc.as_ptr(), std::ptr::null())
        };
        unsafe { XmlDocPtr::from_raw(result) }.ok_or(LibXml2Error::TransformFailed)
    }

    /// Serialize a transformation result to a file, or stdout for "-"
    pub fn write_result(&self, result: &XmlDocPtr, target: &str) -> LibXml2Result<()> {
        let c_target = CString::new(target).map_err(|_| LibXml2Error::InvalidPath {
            path: target.into(),
        })?;
        let written =
            unsafe { xsltSaveResultToFilename(c_target.as_ptr(), result.as_ptr(), self.ptr, 0) };
        if written < 0 {
            return Err(LibXml2Error::OutputFailed);
        }
        Ok(())
    }
}
