//! Man page generation for pvesel

use camino::Utf8Path;
use clap::CommandFactory;
use color_eyre::eyre::Context;
use color_eyre::Result;
use tracing::debug;
use xshell::Shell;

use pvesel::select::SelectOpts;

/// Where generated pages land, relative to the workspace toplevel.
const MAN_DIR: &str = "target/man";

/// Render pvesel(1) from the clap command definition.
pub(crate) fn generate_man_pages(sh: &Shell) -> Result<()> {
    sh.create_dir(MAN_DIR)?;

    let man = clap_mangen::Man::new(SelectOpts::command());
    let mut rendered = Vec::new();
    man.render(&mut rendered)?;
    debug!("rendered {} bytes of roff", rendered.len());

    let path = Utf8Path::new(MAN_DIR).join("pvesel.1");
    std::fs::write(&path, rendered).with_context(|| format!("Writing {path}"))?;
    println!("Generated: {path}");
    Ok(())
}
