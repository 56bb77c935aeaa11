use dupe_grove::*;
use getopts::Options;
use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

enum OutputMode {
    Quiet,
    Text,
    Json,
}

static CTRL_C_BREAKS: AtomicU32 = AtomicU32::new(0);

fn main() {
    let mut opts = Options::new();
    opts.optflag("q", "quiet", "Hide regular progress output");
    opts.optflag("", "json", "Display results as JSON");
    opts.optflag("f", "follow-symlinks", "Resolve symlinks while walking");
    opts.optflag("x", "one-file-system", "Don't cross filesystem boundaries");
    opts.optflag("", "skip-hidden", "Ignore files and directories starting with a dot");
    opts.optflag("", "counts", "Print the per-directory file counts and exit");
    opts.optflag("h", "help", "This help text");

    let mut args = env::args();
    let program = args.next().unwrap_or(env!("CARGO_PKG_NAME").to_owned());

    let matches = match opts.parse(args) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        },
    };

    let output_mode = if matches.opt_present("json") {
        OutputMode::Json
    } else if matches.opt_present("quiet") {
        OutputMode::Quiet
    } else {
        OutputMode::Text
    };

    if matches.opt_present("h") || matches.free.is_empty() {
        println!(
            "Report directory trees with identical contents (v{}).\n{}\n\n{}",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_HOMEPAGE"),
            opts.usage(&(opts.short_usage(&program) + " <directories>"))
        );
        return;
    }

    ctrlc::set_handler(move || {
        CTRL_C_BREAKS.fetch_add(1, Ordering::SeqCst);
    })
    .ok();

    let settings = Settings {
        flags: WalkFlags {
            follow_symlinks: matches.opt_present("follow-symlinks"),
            one_filesystem: matches.opt_present("one-file-system"),
            skip_hidden: matches.opt_present("skip-hidden"),
        },
        break_on: Some(&CTRL_C_BREAKS),
    };
    let roots: Vec<PathBuf> = matches.free.iter().map(PathBuf::from).collect();

    let result = if matches.opt_present("counts") {
        print_counts(&roots, &settings)
    } else {
        inner_main(&roots, settings, output_mode)
    };

    if let Err(err) = result {
        writeln!(&mut std::io::stderr(), "Error: {}", err).unwrap();
        std::process::exit(1);
    }
}

/// Debug view of the counting pre-pass: every directory prefix with the
/// number of regular files somewhere under it, indented by depth.
fn print_counts(roots: &[PathBuf], settings: &Settings) -> Result<(), MergeError> {
    let counts = count_files(roots, settings)?;
    counts.visit(|path, count| {
        print!("{:4} ", count);
        for _ in 0..depth_of(path) {
            print!("  ");
        }
        println!("{}", String::from_utf8_lossy(path));
        false
    });
    Ok(())
}

fn inner_main(roots: &[PathBuf], settings: Settings, output_mode: OutputMode) -> Result<(), MergeError> {
    // Hash everything up front: the merger borrows the reports for its
    // whole lifetime.
    let files = collect_files(roots, &settings)?;
    let mut reports = Vec::with_capacity(files.len());
    for (path, size) in files {
        if settings.breaks() > 0 {
            eprintln!("Stopping scan");
            break;
        }
        match hash_file(&path) {
            Ok(digest) => reports.push(FileReport::new(path, digest, size)),
            Err(err) => eprintln!("{}: {}", path.display(), err),
        }
    }

    // Only files whose content exists somewhere else can make a directory
    // a duplicate, so the merger is fed just those.
    let mut by_digest: HashMap<&[u8], Vec<usize>> = HashMap::new();
    for (idx, report) in reports.iter().enumerate() {
        by_digest.entry(report.digest.as_bytes()).or_default().push(idx);
    }
    let mut duplicates: Vec<usize> = by_digest
        .values()
        .filter(|indices| indices.len() > 1)
        .flatten()
        .copied()
        .collect();
    duplicates.sort_unstable();

    let mut merger = match output_mode {
        OutputMode::Quiet => TreeMerger::new(roots, settings)?,
        OutputMode::Text => {
            TreeMerger::with_listener(roots, settings, Box::new(TextUserInterface::new()))?
        },
        #[cfg(feature = "json")]
        OutputMode::Json => TreeMerger::with_listener(roots, settings, Box::new(JsonOutput::new()))?,
        #[cfg(not(feature = "json"))]
        OutputMode::Json => {
            eprintln!("This binary was compiled without JSON support.");
            std::process::exit(2);
        },
    };

    for idx in duplicates {
        merger.feed(&reports[idx]);
    }
    merger.finish();
    Ok(())
}
