//! Selection policy: pick one storage target from the ranked candidates
//!
//! All branching on the environment and terminal state is resolved once at
//! startup into an [`ExecutionMode`]; the policy itself is a pure function
//! of its inputs plus an injected prompt, so every path is testable.

use std::io::IsTerminal;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::debug;

use crate::candidates::{self, Candidate};
use crate::node::{LocalNode, NodeTools};
use crate::prompt::{LinePrompt, TerminalPrompt};

/// Environment variable naming a storage target that wins outright.
pub const STORAGE_TARGET_VAR: &str = "STORAGE_TARGET";
/// Environment variable forcing automatic selection ("1" or "true").
pub const AUTO_PICK_VAR: &str = "AUTO_PICK";

/// Menu entry for leaving without a selection.
const CANCEL_LABEL: &str = "Cancel / Exit without selecting";

/// Select a Proxmox VE storage target and print its identifier.
///
/// Queries the node storage inventory, keeps the enabled and active
/// block-providing pools that can hold VM disk images, and ranks them by
/// free space. The chosen identifier is the only thing written to stdout;
/// menus and diagnostics go to stderr, so the output is safe to capture
/// from scripts. Setting STORAGE_TARGET skips the inventory entirely, and
/// AUTO_PICK=1 (or a non-terminal stdin) takes the default candidate
/// without prompting.
#[derive(Debug, Parser)]
#[command(name = "pvesel", version)]
pub struct SelectOpts {
    /// Disk image the target must accommodate; its virtual size plus a
    /// 2 GiB margin sets the space requirement. May be omitted or point to
    /// a file that does not exist yet.
    pub image: Option<Utf8PathBuf>,
}

/// How the final choice is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// An operator-supplied identifier wins, bypassing the inventory.
    Override(String),
    /// Take the default candidate without asking.
    AutoPick,
    /// Ask on the controlling terminal.
    Interactive,
    /// Stdin is not a terminal; behaves like auto-pick.
    NonInteractiveFallback,
}

impl ExecutionMode {
    /// Resolve the mode from the process environment and terminal state.
    ///
    /// Consulted once at startup so the selection logic itself never reads
    /// globals.
    pub fn detect() -> Self {
        Self::resolve(
            std::env::var(STORAGE_TARGET_VAR).ok().as_deref(),
            std::env::var(AUTO_PICK_VAR).ok().as_deref(),
            std::io::stdin().is_terminal(),
        )
    }

    fn resolve(target: Option<&str>, auto_pick: Option<&str>, stdin_is_tty: bool) -> Self {
        if let Some(target) = target {
            let target = target.trim();
            if !target.is_empty() {
                return ExecutionMode::Override(target.to_string());
            }
        }
        let auto = auto_pick
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);
        if auto {
            ExecutionMode::AutoPick
        } else if stdin_is_tty {
            ExecutionMode::Interactive
        } else {
            ExecutionMode::NonInteractiveFallback
        }
    }
}

/// Selection inputs resolved once at process startup.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    /// Bytes the chosen pool should provide; 0 enforces nothing.
    pub required_bytes: u64,
    /// How the choice is made.
    pub mode: ExecutionMode,
}

/// Outcome of a completed selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Identifier of the chosen storage pool.
    Storage(String),
    /// The operator declined to choose; not an error.
    Cancelled,
}

/// Entry point for the selector binary.
pub fn run(opts: SelectOpts) -> Result<()> {
    let mode = ExecutionMode::detect();
    match select_storage(&LocalNode, opts.image.as_deref(), mode, &mut TerminalPrompt)? {
        Selection::Storage(storage) => println!("{storage}"),
        Selection::Cancelled => debug!("selection cancelled, emitting nothing"),
    }
    Ok(())
}

/// Run the full selection pipeline against `tools`.
///
/// An override target short-circuits before any external tool runs; all
/// other modes consult the inventory (and the image, when one was given)
/// first.
pub fn select_storage(
    tools: &impl NodeTools,
    image: Option<&Utf8Path>,
    mode: ExecutionMode,
    prompt: &mut dyn LinePrompt,
) -> Result<Selection> {
    if matches!(mode, ExecutionMode::Override(_)) {
        let ctx = SelectionContext {
            required_bytes: 0,
            mode,
        };
        return select(&[], 0, &ctx, prompt);
    }

    let node = tools.hostname()?;
    debug!("selecting a storage target on node {node}");
    let records = tools.storage_pools(&node)?;
    let virtual_size = match image {
        Some(path) => Some(tools.image_virtual_size(path)?),
        None => None,
    };
    let required_bytes = candidates::required_bytes(virtual_size);
    debug!("required bytes: {required_bytes}");

    let ranked = candidates::rank(records, required_bytes);
    debug!("{} eligible candidates", ranked.len());
    let default_index = candidates::default_index(&ranked);
    let ctx = SelectionContext {
        required_bytes,
        mode,
    };
    select(&ranked, default_index, &ctx, prompt)
}

/// Apply the selection policy to ranked candidates.
pub fn select(
    candidates: &[Candidate],
    default_index: usize,
    ctx: &SelectionContext,
    prompt: &mut dyn LinePrompt,
) -> Result<Selection> {
    if let ExecutionMode::Override(target) = &ctx.mode {
        debug!("using storage target override");
        return Ok(Selection::Storage(target.clone()));
    }
    if candidates.is_empty() {
        return Err(eyre!("No eligible storages found."));
    }
    if ctx.mode != ExecutionMode::Interactive {
        let storage = candidates[default_index].storage.clone();
        debug!("auto-selected {storage}");
        return Ok(Selection::Storage(storage));
    }
    interactive_select(candidates, default_index, ctx.required_bytes, prompt)
}

/// Render the numbered menu shown before prompting. The synthetic cancel
/// entry always sits at the end.
fn render_menu(candidates: &[Candidate], default_index: usize) -> String {
    let mut menu = String::from("Available storage targets:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        menu.push_str(&format!("{:2}) {}\n", i + 1, candidate.label()));
    }
    menu.push_str(&format!("{:2}) {CANCEL_LABEL}\n", candidates.len() + 1));
    menu.push('\n');
    menu.push_str(&format!(
        "Default: {}  (Ctrl+C also cancels)\n",
        default_index + 1
    ));
    menu
}

/// Drive the prompt loop until the operator settles on an entry.
///
/// Invalid input reprompts indefinitely. End of input on the prompt device
/// is treated as cancellation: a closed stream can never answer a later
/// confirmation, so substituting the default there could spin forever on a
/// pool that needs confirming.
fn interactive_select(
    candidates: &[Candidate],
    default_index: usize,
    required_bytes: u64,
    prompt: &mut dyn LinePrompt,
) -> Result<Selection> {
    let cancel_index = candidates.len();
    let menu_len = candidates.len() + 1;
    eprint!("{}", render_menu(candidates, default_index));

    let request = format!(
        "\nSelect storage target [1-{menu_len}] (default {}): ",
        default_index + 1
    );
    loop {
        let answer = match prompt.read_line(&request) {
            Ok(Some(line)) => line,
            Ok(None) => {
                eprintln!("Selection cancelled by user.");
                return Ok(Selection::Cancelled);
            }
            Err(err) => {
                debug!("prompt read failed ({err}), taking the default");
                String::new()
            }
        };
        let answer = if answer.is_empty() {
            (default_index + 1).to_string()
        } else {
            answer
        };
        let choice = match answer.parse::<usize>() {
            Ok(n) if (1..=menu_len).contains(&n) => n - 1,
            _ => {
                eprintln!("Please enter a valid number.");
                continue;
            }
        };
        if choice == cancel_index {
            eprintln!("Selection cancelled by user.");
            return Ok(Selection::Cancelled);
        }
        let candidate = &candidates[choice];
        if !candidate.fits && required_bytes > 0 {
            match prompt.read_line("Selected storage may be low on space. Continue anyway? [y/N]: ")
            {
                Ok(Some(answer)) if matches!(answer.to_lowercase().as_str(), "y" | "yes") => {}
                Ok(Some(_)) => continue,
                Ok(None) => {
                    eprintln!("Selection cancelled by user.");
                    return Ok(Selection::Cancelled);
                }
                Err(err) => {
                    debug!("confirmation read failed ({err})");
                    eprintln!("Selection cancelled by user.");
                    return Ok(Selection::Cancelled);
                }
            }
        }
        return Ok(Selection::Storage(candidate.storage.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvesh::{StorageRecord, StorageType};
    use indoc::indoc;
    use similar_asserts::assert_eq;
    use std::collections::VecDeque;

    const GIB: u64 = 1024 * 1024 * 1024;

    /// Prompt fake that replays a fixed script, then reports end of input.
    #[derive(Debug, Default)]
    struct ScriptedPrompt {
        answers: VecDeque<String>,
        prompts: Vec<String>,
    }

    impl ScriptedPrompt {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|s| s.to_string()).collect(),
                prompts: Vec::new(),
            }
        }
    }

    impl LinePrompt for ScriptedPrompt {
        fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
            self.prompts.push(prompt.to_string());
            Ok(self.answers.pop_front().map(|s| s.trim().to_string()))
        }
    }

    /// Prompt fake whose reads always fail with an I/O error.
    #[derive(Debug)]
    struct BrokenPrompt;

    impl LinePrompt for BrokenPrompt {
        fn read_line(&mut self, _prompt: &str) -> std::io::Result<Option<String>> {
            Err(std::io::Error::other("tty went away"))
        }
    }

    /// Node fake backed by a fixed inventory.
    #[derive(Debug)]
    struct FakeNode {
        pools: Vec<StorageRecord>,
        image_size: u64,
    }

    impl NodeTools for FakeNode {
        fn hostname(&self) -> Result<String> {
            Ok("pve1".to_string())
        }

        fn storage_pools(&self, node: &str) -> Result<Vec<StorageRecord>> {
            assert_eq!(node, "pve1");
            Ok(self.pools.clone())
        }

        fn image_virtual_size(&self, _path: &Utf8Path) -> Result<u64> {
            Ok(self.image_size)
        }
    }

    /// Node fake that must never be consulted.
    #[derive(Debug)]
    struct ExplodingNode;

    impl NodeTools for ExplodingNode {
        fn hostname(&self) -> Result<String> {
            panic!("hostname queried in override mode");
        }

        fn storage_pools(&self, _node: &str) -> Result<Vec<StorageRecord>> {
            panic!("inventory queried in override mode");
        }

        fn image_virtual_size(&self, _path: &Utf8Path) -> Result<u64> {
            panic!("image inspected in override mode");
        }
    }

    fn record(storage: &str, avail: u64) -> StorageRecord {
        StorageRecord {
            storage: storage.to_string(),
            ty: StorageType::Zfspool,
            enabled: true,
            active: true,
            content: "images,rootdir".to_string(),
            avail,
        }
    }

    fn candidate(storage: &str, avail: u64, fits: bool) -> Candidate {
        Candidate {
            avail,
            storage: storage.to_string(),
            ty: StorageType::Zfspool,
            fits,
        }
    }

    fn interactive_ctx(required_bytes: u64) -> SelectionContext {
        SelectionContext {
            required_bytes,
            mode: ExecutionMode::Interactive,
        }
    }

    #[test]
    fn test_override_returns_target_verbatim() {
        let ctx = SelectionContext {
            required_bytes: 0,
            mode: ExecutionMode::Override("fast-nvme".to_string()),
        };
        let mut prompt = ScriptedPrompt::new(&[]);
        let got = select(&[], 0, &ctx, &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("fast-nvme".to_string()));
        assert!(prompt.prompts.is_empty());
    }

    #[test]
    fn test_override_skips_all_node_tools() {
        let got = select_storage(
            &ExplodingNode,
            Some(Utf8Path::new("/tmp/vm.qcow2")),
            ExecutionMode::Override("pinned".to_string()),
            &mut ScriptedPrompt::new(&[]),
        )
        .unwrap();
        assert_eq!(got, Selection::Storage("pinned".to_string()));
    }

    #[test]
    fn test_auto_pick_takes_default_without_prompting() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, true),
        ];
        let ctx = SelectionContext {
            required_bytes: 0,
            mode: ExecutionMode::AutoPick,
        };
        let mut prompt = ScriptedPrompt::new(&[]);
        let got = select(&cands, 0, &ctx, &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        assert!(prompt.prompts.is_empty());
    }

    #[test]
    fn test_non_interactive_fallback_takes_default() {
        let cands = [
            candidate("big", 10 * GIB, false),
            candidate("small", GIB, false),
        ];
        let ctx = SelectionContext {
            required_bytes: 20 * GIB,
            mode: ExecutionMode::NonInteractiveFallback,
        };
        let mut prompt = ScriptedPrompt::new(&[]);
        let got = select(&cands, 0, &ctx, &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        assert!(prompt.prompts.is_empty());
    }

    #[test]
    fn test_no_candidates_is_an_error() {
        let ctx = SelectionContext {
            required_bytes: 0,
            mode: ExecutionMode::AutoPick,
        };
        let err = select(&[], 0, &ctx, &mut ScriptedPrompt::new(&[])).unwrap_err();
        assert!(err.to_string().contains("No eligible storages found."));
    }

    #[test]
    fn test_interactive_numbered_choice() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, true),
        ];
        let mut prompt = ScriptedPrompt::new(&["2"]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("small".to_string()));
        // the prompt advertises the full range including the cancel entry
        assert_eq!(
            prompt.prompts[0],
            "\nSelect storage target [1-3] (default 1): "
        );
    }

    #[test]
    fn test_interactive_empty_line_takes_default() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, true),
        ];
        let mut prompt = ScriptedPrompt::new(&[""]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
    }

    #[test]
    fn test_interactive_cancel_entry() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, true),
        ];
        let mut prompt = ScriptedPrompt::new(&["3"]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Cancelled);
    }

    #[test]
    fn test_interactive_end_of_input_cancels() {
        let cands = [candidate("big", 10 * GIB, true)];
        let mut prompt = ScriptedPrompt::new(&[]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Cancelled);
    }

    #[test]
    fn test_interactive_reprompts_until_valid() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, true),
        ];
        let mut prompt = ScriptedPrompt::new(&["zfs", "99", "0", "1"]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        assert_eq!(prompt.prompts.len(), 4);
    }

    #[test]
    fn test_read_error_takes_default_when_it_fits() {
        let cands = [candidate("big", 10 * GIB, true)];
        let got = select(&cands, 0, &interactive_ctx(0), &mut BrokenPrompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
    }

    #[test]
    fn test_read_error_on_confirmation_cancels() {
        // default needs confirming, and the broken stream can never say yes
        let cands = [candidate("big", GIB, false)];
        let got = select(&cands, 0, &interactive_ctx(5 * GIB), &mut BrokenPrompt).unwrap();
        assert_eq!(got, Selection::Cancelled);
    }

    #[test]
    fn test_low_space_confirmation_defaults_to_no() {
        let cands = [
            candidate("big", 2 * GIB, false),
            candidate("small", GIB, false),
        ];
        let mut prompt = ScriptedPrompt::new(&["1", "", "2", "y"]);
        let got = select(&cands, 0, &interactive_ctx(5 * GIB), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("small".to_string()));
        assert_eq!(prompt.prompts.len(), 4);
        assert_eq!(
            prompt.prompts[1],
            "Selected storage may be low on space. Continue anyway? [y/N]: "
        );
    }

    #[test]
    fn test_low_space_confirmation_accepts_yes() {
        let cands = [candidate("big", 2 * GIB, false)];
        let mut prompt = ScriptedPrompt::new(&["1", "YES"]);
        let got = select(&cands, 0, &interactive_ctx(5 * GIB), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
    }

    #[test]
    fn test_end_of_input_during_confirmation_cancels() {
        let cands = [candidate("big", 2 * GIB, false)];
        let mut prompt = ScriptedPrompt::new(&["1"]);
        let got = select(&cands, 0, &interactive_ctx(5 * GIB), &mut prompt).unwrap();
        assert_eq!(got, Selection::Cancelled);
    }

    #[test]
    fn test_fitting_choice_needs_no_confirmation() {
        let cands = [candidate("big", 10 * GIB, true)];
        let mut prompt = ScriptedPrompt::new(&["1"]);
        let got = select(&cands, 0, &interactive_ctx(5 * GIB), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        assert_eq!(prompt.prompts.len(), 1);
    }

    #[test]
    fn test_zero_requirement_skips_confirmation() {
        let cands = [candidate("big", GIB, false)];
        let mut prompt = ScriptedPrompt::new(&["1"]);
        let got = select(&cands, 0, &interactive_ctx(0), &mut prompt).unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        assert_eq!(prompt.prompts.len(), 1);
    }

    #[test]
    fn test_menu_rendering() {
        let cands = [
            candidate("big", 10 * GIB, true),
            candidate("small", GIB, false),
        ];
        let expected = indoc! {"
            Available storage targets:
             1) big (zfspool, free 10.0 GiB)
             2) small (zfspool, free 1.0 GiB) [INSUFFICIENT SPACE]
             3) Cancel / Exit without selecting

            Default: 1  (Ctrl+C also cancels)
        "};
        assert_eq!(render_menu(&cands, 0), expected);
    }

    #[test]
    fn test_pipeline_filters_and_ranks() {
        let mut inactive = record("frozen", 50 * GIB);
        inactive.active = false;
        let mut directory = record("local", 100 * GIB);
        directory.ty = StorageType::Other;
        let tools = FakeNode {
            pools: vec![
                record("small", GIB),
                inactive,
                directory,
                record("tank", 10 * GIB),
            ],
            image_size: 0,
        };
        let got = select_storage(
            &tools,
            None,
            ExecutionMode::AutoPick,
            &mut ScriptedPrompt::new(&[]),
        )
        .unwrap();
        assert_eq!(got, Selection::Storage("tank".to_string()));
    }

    #[test]
    fn test_pipeline_applies_image_margin() {
        // 10 GiB image + 2 GiB margin: the 11 GiB pool must be flagged
        let tools = FakeNode {
            pools: vec![record("big", 13 * GIB), record("small", 11 * GIB)],
            image_size: 10 * GIB,
        };
        let mut prompt = ScriptedPrompt::new(&["2", "n", "1"]);
        let got = select_storage(
            &tools,
            Some(Utf8Path::new("/tmp/vm.qcow2")),
            ExecutionMode::Interactive,
            &mut prompt,
        )
        .unwrap();
        assert_eq!(got, Selection::Storage("big".to_string()));
        // choosing the short pool asked for confirmation first
        assert_eq!(prompt.prompts.len(), 3);
        assert!(prompt.prompts[1].starts_with("Selected storage may be low on space"));
    }

    #[test]
    fn test_pipeline_reports_empty_inventory() {
        let tools = FakeNode {
            pools: Vec::new(),
            image_size: 0,
        };
        let err = select_storage(
            &tools,
            None,
            ExecutionMode::AutoPick,
            &mut ScriptedPrompt::new(&[]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No eligible storages found."));
    }

    #[test]
    fn test_mode_resolution() {
        assert_eq!(
            ExecutionMode::resolve(Some("  pinned  "), None, true),
            ExecutionMode::Override("pinned".to_string())
        );
        // whitespace-only pin falls through to the other modes
        assert_eq!(
            ExecutionMode::resolve(Some("   "), Some("TRUE"), false),
            ExecutionMode::AutoPick
        );
        assert_eq!(
            ExecutionMode::resolve(None, Some("0"), true),
            ExecutionMode::Interactive
        );
        assert_eq!(
            ExecutionMode::resolve(None, None, true),
            ExecutionMode::Interactive
        );
        assert_eq!(
            ExecutionMode::resolve(None, None, false),
            ExecutionMode::NonInteractiveFallback
        );
    }
}
