// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line driver: loads a PlayStation executable, applies the
//! annotations, and writes the disassembly listing plus the pseudo-C++
//! rendition next to each other in the output directory.

mod log;

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use exegesis_exe::{annotations, Exe};
use getopts::Options;

struct Args {
    exe_path: PathBuf,
    annotations_path: Option<PathBuf>,
    out_dir: PathBuf,
    gp_override: Option<u32>,
}

fn main() {
    log::init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        // Help was printed.
        Ok(None) => return,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(&args) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let argv = std::env::args().collect::<Vec<_>>();

    let mut opts = Options::new();
    opts.optopt("a", "annotations", "annotations file (program elements, jr handlers, $gp)", "FILE");
    opts.optopt("o", "out-dir", "output directory (default: current directory)", "DIR");
    opts.optopt("", "gp", "assume this $gp value during constant evaluation", "HEX");
    opts.optflag("h", "help", "print this help menu");

    let usage = || opts.usage(&format!("Usage: {} [options] <EXE>", argv[0]));

    let matches = match opts.parse(&argv[1..]) {
        Ok(matches) => matches,
        Err(err) => bail!("{}\n{}", err, usage()),
    };

    if matches.opt_present("h") {
        print!("{}", usage());
        return Ok(None);
    }

    let [exe_path] = &matches.free[..] else {
        bail!("expected exactly one input file\n{}", usage());
    };

    let gp_override = matches
        .opt_str("gp")
        .map(|text| {
            let digits = text.strip_prefix("0x").unwrap_or(&text).to_owned();
            u32::from_str_radix(&digits, 16).with_context(|| format!("bad --gp value {:?}", text))
        })
        .transpose()?;

    Ok(Some(Args {
        exe_path: PathBuf::from(exe_path),
        annotations_path: matches.opt_str("a").map(PathBuf::from),
        out_dir: matches.opt_str("o").map_or_else(|| PathBuf::from("."), PathBuf::from),
        gp_override,
    }))
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut exe = Exe::load_from_file(&args.exe_path)?;

    if let Some(path) = &args.annotations_path {
        annotations::apply_annotations_file(&mut exe, path)?;
    }
    if let Some(gp) = args.gp_override {
        exe.assumed_gp = Some(gp);
    }

    exe.determine_word_references();

    let stem = args
        .exe_path
        .file_stem()
        .context("input path has no file name")?
        .to_string_lossy()
        .into_owned();

    write_output(&args.out_dir.join(format!("{}.disasm.txt", stem)), |out| {
        exegesis_printer::print_exe_listing(&exe, out)
    })?;
    write_output(&args.out_dir.join(format!("{}.cpp", stem)), |out| {
        exegesis_printer::print_exe_cpp(&exe, out)
    })?;

    Ok(())
}

fn write_output(
    path: &Path,
    print: impl FnOnce(&mut BufWriter<File>) -> Result<(), exegesis_printer::Error>,
) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    print(&mut out).with_context(|| format!("failed to write {}", path.display()))?;
    out.flush().with_context(|| format!("failed to write {}", path.display()))?;

    tracing::debug!("wrote {}", path.display());

    Ok(())
}
