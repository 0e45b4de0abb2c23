//! Tests for Compiler::compile: target resolution, entry synthesis, exports
//! and module ownership.

use frameweave::core::error::FrontendError;
use frameweave::driver::failed_disposals;
use frameweave::frontend::ast::{
    Block, Expr, FuncDecl, FuncLit, Package, Param, SourceFile, Stmt, Type,
};
use frameweave::llvm::{COMPILE_UNITS_METADATA, PNACL_TRIPLE, TargetSpec};
use frameweave::{CompileError, Compiler, CompilerOptions, Frontend, PreparedFrontend};
use inkwell::context::Context;
use std::panic::{self, AssertUnwindSafe};

const TRIPLE: &str = "x86_64-unknown-linux-gnu";

fn compiler(triple: &str, files: Vec<SourceFile>) -> Compiler<PreparedFrontend> {
    let _ = env_logger::builder().is_test(true).try_init();
    let frontend = files
        .into_iter()
        .fold(PreparedFrontend::new(), PreparedFrontend::with_file);
    Compiler::new(CompilerOptions::new(triple), frontend)
}

fn main_package(funcs: Vec<FuncDecl>) -> SourceFile {
    SourceFile::new("main.go", "main", funcs)
}

#[test]
fn test_resolves_alias_table_architecture() {
    let target = TargetSpec::resolve(TRIPLE).unwrap();
    assert_eq!(target.arch(), "x86-64");
    assert!(!target.rewritten_from_alias());
    assert!(!target.data_layout().is_empty());
}

#[test]
fn test_unknown_triple_fails_before_front_end() {
    let context = Context::create();
    let compiler = compiler("foo-bar-baz", vec![]);

    let err = compiler.compile(&context, &["main.go"], "main").unwrap_err();
    assert!(matches!(err, CompileError::InvalidTarget { .. }));
    assert!(err.to_string().contains("foo-bar-baz"));
}

#[test]
fn test_root_package_gets_native_entry() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );

    let module = compiler.compile(&context, &["main.go"], "main").unwrap();
    assert_eq!(module.name(), "main");
    let llvm = module.as_llvm().unwrap();
    assert_eq!(llvm.get_triple().as_str().to_str().unwrap(), TRIPLE);
    assert!(llvm.get_function("main.main").is_some());

    let main = llvm.get_function("main").unwrap();
    assert_eq!(main.count_params(), 3);

    let ir = module.print_to_string().unwrap();
    assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv, ptr %envp)"));
    assert!(ir.contains(
        "%status = call i32 @runtime.main(i32 %argc, ptr %argv, ptr %envp, ptr @main.main)"
    ));
    assert!(ir.contains("ret i32 %status"));
    assert!(ir.contains("declare i32 @runtime.main(i32, ptr, ptr, ptr)"));
    assert!(compiler.frontend().exported().is_empty());
}

#[test]
fn test_main_package_name_overrides_import_path() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );

    let module = compiler.compile(&context, &["main.go"], "cmd/tool").unwrap();
    assert_eq!(module.name(), "main");
    assert!(module.as_llvm().unwrap().get_function("main").is_some());
}

#[test]
fn test_root_without_entry_reports_missing_symbol() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("helper", vec![])])],
    );

    let err = compiler.compile(&context, &["main.go"], "main").unwrap_err();
    assert!(matches!(err, CompileError::MissingEntry { .. }));
    assert_eq!(err.to_string(), "Could not find main.main");
}

#[test]
fn test_library_package_is_exported() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![SourceFile::new(
            "util.go",
            "util",
            vec![FuncDecl::procedure("helper", vec![])],
        )],
    );

    let module = compiler
        .compile(&context, &["util.go"], "example.com/util")
        .unwrap();
    let llvm = module.as_llvm().unwrap();
    assert!(llvm.get_function("example.com/util.helper").is_some());
    assert!(llvm.get_function("main").is_none());
    assert_eq!(compiler.frontend().exported(), vec!["example.com/util".to_string()]);
}

#[test]
fn test_empty_import_path_defaults_to_package_name() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![SourceFile::new("util.go", "util", vec![FuncDecl::procedure("helper", vec![])])],
    );

    let module = compiler.compile(&context, &["util.go"], "").unwrap();
    assert_eq!(module.name(), "util");
    assert!(module.as_llvm().unwrap().get_function("util.helper").is_some());
}

#[test]
fn test_front_end_errors_pass_through_unchanged() {
    let context = Context::create();
    let compiler = compiler(TRIPLE, vec![]);

    let err = compiler.compile(&context, &["missing.go"], "main").unwrap_err();
    assert!(matches!(err, CompileError::Frontend(_)));
    assert_eq!(err.to_string(), "missing.go: no such source file");

    let direct = compiler.frontend().parse_files(&["missing.go"]).unwrap_err();
    assert_eq!(err.to_string(), direct.to_string());
}

#[test]
fn test_multiple_files_form_one_package() {
    let context = Context::create();
    let helper = FuncDecl::new(
        "helper",
        FuncLit::new(
            vec![],
            vec![Param::new("", Type::Int)],
            Block::new(vec![Stmt::Return(vec![Expr::Int(7)])]),
        ),
    );
    let compiler = compiler(
        TRIPLE,
        vec![
            main_package(vec![FuncDecl::procedure(
                "main",
                vec![Stmt::Expr(Expr::call("helper", vec![]))],
            )]),
            SourceFile::new("helper.go", "main", vec![helper]),
        ],
    );

    let module = compiler
        .compile(&context, &["main.go", "helper.go"], "main")
        .unwrap();
    let ir = module.print_to_string().unwrap();
    assert!(ir.contains("call i64 @main.helper()"));
}

#[test]
fn test_initializers_registered_in_reverse_order() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![SourceFile::new(
            "util.go",
            "util",
            vec![
                FuncDecl::procedure("init", vec![]),
                FuncDecl::procedure("helper", vec![]),
                FuncDecl::procedure("init", vec![]),
            ],
        )],
    );

    let module = compiler.compile(&context, &["util.go"], "util").unwrap();
    let ir = module.print_to_string().unwrap();
    assert!(ir.contains("define void @util.init.0()"));
    assert!(ir.contains("define void @util.init.1()"));
    assert!(ir.contains("@runtime.ctors = appending global [2 x ptr] [ptr @util.init.1, ptr @util.init.0]"));
}

#[test]
fn test_failed_compile_returns_no_module() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure(
            "main",
            vec![Stmt::Expr(Expr::call("undeclared", vec![]))],
        )])],
    );

    let err = compiler.compile(&context, &["main.go"], "main").unwrap_err();
    assert!(err.is_internal());
    assert!(err.to_string().contains("undeclared"));

    // A later compile in the same context starts from scratch.
    let compiler = self::compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );
    let module = compiler.compile(&context, &["main.go"], "main").unwrap();
    assert!(module.as_llvm().unwrap().verify().is_ok());
}

#[test]
fn test_dispose_is_idempotent() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );

    let mut module = compiler.compile(&context, &["main.go"], "main").unwrap();
    assert!(!module.is_disposed());
    assert!(module.dispose());
    assert!(module.is_disposed());
    assert!(!module.dispose());
    assert!(module.print_to_string().is_none());
}

/// Front end whose exporter panics after lowering has filled the module.
struct PanickingExporter(PreparedFrontend);

impl Frontend for PanickingExporter {
    fn parse_files(&self, filenames: &[&str]) -> Result<Vec<SourceFile>, FrontendError> {
        self.0.parse_files(filenames)
    }

    fn check_package(
        &self,
        import_path: &str,
        files: Vec<SourceFile>,
    ) -> Result<Package, FrontendError> {
        self.0.check_package(import_path, files)
    }

    fn export_package(&self, package: &Package) -> Result<(), FrontendError> {
        panic!("exporter crashed on {}", package.path);
    }
}

#[test]
fn test_panicking_export_disposes_module() {
    let context = Context::create();
    let frontend = PreparedFrontend::new().with_file(SourceFile::new(
        "util.go",
        "util",
        vec![FuncDecl::procedure("helper", vec![])],
    ));
    let compiler = Compiler::new(CompilerOptions::new(TRIPLE), PanickingExporter(frontend));
    let before = failed_disposals();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        compiler.compile(&context, &["util.go"], "util").map(|_| ())
    }));
    assert!(outcome.is_err());
    assert_eq!(failed_disposals(), before + 1);
}

#[test]
fn test_error_return_disposes_module() {
    let context = Context::create();
    let before = failed_disposals();

    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("helper", vec![])])],
    );
    assert!(compiler.compile(&context, &["main.go"], "main").is_err());
    assert_eq!(failed_disposals(), before + 1);

    let compiler = self::compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );
    let module = compiler.compile(&context, &["main.go"], "main").unwrap();
    assert!(!module.is_disposed());
    assert_eq!(failed_disposals(), before + 1);
}

#[test]
fn test_entry_with_results_is_rejected() {
    let context = Context::create();
    let entry = FuncDecl::new(
        "main",
        FuncLit::new(
            vec![],
            vec![Param::new("", Type::Int)],
            Block::new(vec![Stmt::Return(vec![Expr::Int(0)])]),
        ),
    );
    let compiler = compiler(TRIPLE, vec![main_package(vec![entry])]);

    let err = compiler.compile(&context, &["main.go"], "main").unwrap_err();
    assert!(matches!(err, CompileError::InvalidEntry { .. }));
    assert!(!err.is_internal());
    assert_eq!(
        err.to_string(),
        "main.main must take no parameters and return no results"
    );
}

#[test]
fn test_debug_info_adds_compile_unit_per_file() {
    let context = Context::create();
    let files = vec![
        main_package(vec![FuncDecl::procedure("main", vec![])]),
        SourceFile::new("cmd/helper.go", "main", vec![FuncDecl::procedure("helper", vec![])]),
    ];
    let frontend = files
        .into_iter()
        .fold(PreparedFrontend::new(), PreparedFrontend::with_file);
    let compiler = Compiler::new(
        CompilerOptions::new(TRIPLE).with_debug_info(true),
        frontend,
    );

    let module = compiler
        .compile(&context, &["main.go", "cmd/helper.go"], "main")
        .unwrap();
    let llvm = module.as_llvm().unwrap();
    assert_eq!(llvm.get_global_metadata_size(COMPILE_UNITS_METADATA), 2);
    assert!(llvm.verify().is_ok());

    let ir = module.print_to_string().unwrap();
    assert!(ir.contains("!DIFile(filename: \"main.go\", directory: \".\")"));
    assert!(ir.contains("!DIFile(filename: \"helper.go\", directory: \"cmd\")"));
}

#[test]
fn test_debug_info_is_off_by_default() {
    let context = Context::create();
    let compiler = compiler(
        TRIPLE,
        vec![main_package(vec![FuncDecl::procedure("main", vec![])])],
    );
    assert!(!compiler.options().generate_debug);

    let module = compiler.compile(&context, &["main.go"], "main").unwrap();
    let llvm = module.as_llvm().unwrap();
    assert_eq!(llvm.get_global_metadata_size(COMPILE_UNITS_METADATA), 0);
    assert!(!module.print_to_string().unwrap().contains("DICompileUnit"));
}

#[test]
fn test_sandboxed_alias_canonicalizes() {
    let (triple, rewritten) = frameweave::llvm::canonicalize_triple("pnacl");
    assert_eq!(triple, PNACL_TRIPLE);
    assert!(rewritten);
}
