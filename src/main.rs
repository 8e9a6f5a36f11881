use std::process::exit;

use clap::Parser as ClapParser;
use colored::Colorize;

use quillc::{
    frontend::{parser::Parser, SourceFile},
    options::CompilerOptions,
    pass_manager::PassManager,
    passes,
};

fn main() {
    let options = CompilerOptions::parse();

    let mut manager = PassManager::new(options);
    passes::register_standard_passes(&mut manager);

    if manager.options.list_passes {
        manager.list_passes();
        return;
    }

    let Some(path) = manager.options.source_file.clone() else {
        eprintln!("{}: no source file given", "error".red());
        exit(1);
    };

    let source = match SourceFile::from_file(path.clone()) {
        Ok(source) => source,
        Err(error) => {
            eprintln!(
                "{}: unable to read {}: {error}",
                "error".red(),
                path.display()
            );
            exit(1);
        }
    };

    let mut program = Parser::parse_program(&source);

    let from = manager.options.run_from.clone();
    let to = manager.options.run_until.clone();
    manager.run_from_until(from.as_deref(), to.as_deref(), &mut program, true);

    manager.post_process();
}
