// This module defines the narrow contract between the code generator and the external front
// end. The Frontend trait bundles the three collaborators the driver calls: parse_files turns
// file names into syntax trees, check_package type checks them into a Package, and
// export_package publishes a non-root package's interface. Their errors are boxed and passed
// through the driver unchanged. PreparedFrontend is a small in-memory implementation that
// resolves file names against pre-registered trees and records exported packages; embedders
// that already hold checked trees and the test suite use it.

//! External front-end contract and syntax trees.

pub mod ast;

use crate::core::error::FrontendError;
use ast::{Package, SourceFile};
use hashbrown::{HashMap, HashSet};
use std::cell::RefCell;

pub use ast::{
    BinaryOp, Block, CallExpr, Expr, FuncDecl, FuncLit, Param, Signature, Stmt, Type,
};

/// Parser, type checker and exporter used by the driver.
pub trait Frontend {
    /// Parse the named files.
    fn parse_files(&self, filenames: &[&str]) -> Result<Vec<SourceFile>, FrontendError>;

    /// Type check parsed files into one package with the given import path.
    fn check_package(&self, import_path: &str, files: Vec<SourceFile>)
        -> Result<Package, FrontendError>;

    /// Export the public interface of a non-root package.
    fn export_package(&self, package: &Package) -> Result<(), FrontendError>;
}

/// Front end over syntax trees registered ahead of time.
#[derive(Debug, Default)]
pub struct PreparedFrontend {
    files: HashMap<String, SourceFile>,
    exported: RefCell<Vec<String>>,
}

impl PreparedFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: SourceFile) -> Self {
        self.add_file(file);
        self
    }

    pub fn add_file(&mut self, file: SourceFile) {
        self.files.insert(file.name.clone(), file);
    }

    /// Import paths of every package exported so far.
    pub fn exported(&self) -> Vec<String> {
        self.exported.borrow().clone()
    }
}

impl Frontend for PreparedFrontend {
    fn parse_files(&self, filenames: &[&str]) -> Result<Vec<SourceFile>, FrontendError> {
        filenames
            .iter()
            .map(|name| {
                self.files
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| -> FrontendError { format!("{}: no such source file", name).into() })
            })
            .collect()
    }

    fn check_package(
        &self,
        import_path: &str,
        files: Vec<SourceFile>,
    ) -> Result<Package, FrontendError> {
        let Some(first) = files.first() else {
            return Err("no source files".into());
        };
        let name = first.package.clone();

        let mut seen = HashSet::new();
        let mut funcs = Vec::new();
        let mut file_names = Vec::with_capacity(files.len());
        for file in files {
            if file.package != name {
                return Err(format!(
                    "{}: found package {}, expected {}",
                    file.name, file.package, name
                )
                .into());
            }
            for func in file.funcs {
                if !func.is_init() && !seen.insert(func.name.clone()) {
                    return Err(format!("{}: {} redeclared", file.name, func.name).into());
                }
                funcs.push(func);
            }
            file_names.push(file.name);
        }

        Ok(Package {
            name,
            path: import_path.to_string(),
            files: file_names,
            funcs,
        })
    }

    fn export_package(&self, package: &Package) -> Result<(), FrontendError> {
        self.exported.borrow_mut().push(package.path.clone());
        Ok(())
    }
}
