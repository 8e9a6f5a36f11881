use std::path::PathBuf;

use clap::Parser as ClapParser;

/// Run-time configuration for one compilation. Pass enablement predicates,
/// tracing, and the dump hooks all read from this; nothing in the middle-end
/// mutates it.
#[derive(Debug, Clone, ClapParser)]
#[command(version, about = "Quill optimizing compiler middle-end", long_about = None)]
pub struct CompilerOptions {
    /// Quill source file to compile
    pub source_file: Option<PathBuf>,

    /// Optimization level (0 disables the iterated optimization passes)
    #[arg(short = 'O', long, default_value_t = 0)]
    pub optimize: u32,

    /// Upper bound on optimization rounds per function. The loop is not
    /// guaranteed to reach a fixpoint; it simply stops after this many
    /// rounds.
    #[arg(long, default_value_t = 1)]
    pub opt_iterations: u32,

    /// Print the name of each pass as it runs
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug tracing while the named pass runs (repeatable)
    #[arg(long, value_name = "PASS")]
    pub debug: Vec<String>,

    /// Unparse the program after the named pass runs (repeatable)
    #[arg(long, value_name = "PASS")]
    pub dump: Vec<String>,

    /// Unparse the program in uppered form after the named pass runs
    #[arg(long, value_name = "PASS")]
    pub udump: Vec<String>,

    /// Dump the program as a graphviz graph after the named pass runs
    #[arg(long, value_name = "PASS")]
    pub ddump: Vec<String>,

    /// Dump the program as XML after the named pass runs
    #[arg(long, value_name = "PASS")]
    pub xdump: Vec<String>,

    /// Dump each function's CFG as graphviz at the named optimization step
    #[arg(long, value_name = "PASS")]
    pub cfg_dump: Vec<String>,

    /// Run the IR well-formedness check after every pass
    #[arg(long)]
    pub check: bool,

    /// List every registered pass and exit
    #[arg(long)]
    pub list_passes: bool,

    /// Start executing at the named pass
    #[arg(long, value_name = "PASS")]
    pub run_from: Option<String>,

    /// Stop executing after the named pass
    #[arg(long, value_name = "PASS")]
    pub run_until: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            source_file: None,
            optimize: 0,
            opt_iterations: 1,
            verbose: false,
            debug: Vec::new(),
            dump: Vec::new(),
            udump: Vec::new(),
            ddump: Vec::new(),
            xdump: Vec::new(),
            cfg_dump: Vec::new(),
            check: false,
            list_passes: false,
            run_from: None,
            run_until: None,
        }
    }
}
