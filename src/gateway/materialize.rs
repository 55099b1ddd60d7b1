/*!
Argument materialization: request args → child argv plus temp file bindings.
*/

use std::path::PathBuf;

use super::request::ArgSpec;
use super::tempfiles::TempFileAllocator;
use crate::errors::GatewayError;

/// A temp file handed to the child, remembered for the download handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFileBinding {
    pub path: PathBuf,
    pub download: bool,
    pub download_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializedArgs {
    /// Argument vector for the child; passed as-is, never through a shell.
    pub argv: Vec<String>,
    /// One binding per placeholder, in request order.
    pub bindings: Vec<TempFileBinding>,
}

pub struct ArgumentMaterializer<'a> {
    allocator: &'a TempFileAllocator,
}

impl<'a> ArgumentMaterializer<'a> {
    pub fn new(allocator: &'a TempFileAllocator) -> Self {
        Self { allocator }
    }

    pub fn materialize(&self, args: &[ArgSpec]) -> Result<MaterializedArgs, GatewayError> {
        let mut out = MaterializedArgs::default();
        for arg in args {
            match arg {
                ArgSpec::Literal(s) => out.argv.push(s.clone()),
                ArgSpec::TempFile(ph) => {
                    let path = self.allocator.allocate().map_err(GatewayError::TempFile)?;
                    out.argv.push(path.to_string_lossy().into_owned());
                    out.bindings.push(TempFileBinding {
                        path,
                        download: ph.download,
                        download_name: ph.download_name.clone(),
                    });
                }
            }
        }
        Ok(out)
    }
}
