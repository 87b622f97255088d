//! Boot menu model.
//!
//! A menu specification string names the extra per-kernel entries shown
//! after each kernel's primary stanza. Two forms are accepted:
//!
//! ```text
//! short1:long1:extra1;short2:long2:extra2     delimited form
//! liveinst autoinst                           legacy form (bare short names)
//! ```
//!
//! `liveinst;autoinst` and `liveinst::;autoinst::` are equivalent to the legacy
//! form. [`layout::build_layout`] turns a parsed specification plus the kernel
//! variants into the ordered [`MenuEntry`] list rendered by both bootloaders.

pub mod layout;

pub use layout::{build_layout, LayoutOptions};

/// One segment of a menu specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemSpec {
    pub short: String,
    pub long: Option<String>,
    pub extra: Option<String>,
}

/// Parsed menu specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuSpecification {
    pub items: Vec<MenuItemSpec>,
}

impl MenuSpecification {
    /// Parse either the delimited or the legacy whitespace form.
    ///
    /// Empty long/extra fields count as absent. Segments with an empty short
    /// name are dropped.
    pub fn parse(spec: &str) -> Self {
        let segments: Vec<Vec<&str>> = spec
            .split(';')
            .map(|segment| segment.splitn(3, ':').collect())
            .collect();

        let items = if segments.len() == 1 && segments[0].len() == 1 {
            spec.split_whitespace()
                .map(|short| MenuItemSpec {
                    short: short.to_string(),
                    long: None,
                    extra: None,
                })
                .collect()
        } else {
            segments
                .into_iter()
                .filter_map(|fields| {
                    let short = fields.first()?.trim();
                    if short.is_empty() {
                        return None;
                    }
                    Some(MenuItemSpec {
                        short: short.to_string(),
                        long: non_empty(fields.get(1)),
                        extra: non_empty(fields.get(2)),
                    })
                })
                .collect()
        };

        Self { items }
    }

    pub fn short_names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.short.as_str()).collect()
    }

    pub fn contains(&self, short: &str) -> bool {
        self.items.iter().any(|i| i.short == short)
    }
}

fn non_empty(field: Option<&&str>) -> Option<String> {
    field
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

/// What a menu entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain boot of a kernel variant.
    Primary,
    /// Entry from the menu specification (install-only, autoinstall, ...).
    Custom,
    BasicGraphics,
    /// Media check, then boot.
    Verify,
    NetInstall,
    /// Opens the troubleshooting submenu.
    Troubleshooting,
    LocalBoot,
    Memtest,
    /// Leaves the troubleshooting submenu.
    Return,
}

/// A rendered boot menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Label name (`linux0`, `liveinst0`, ...).
    pub short: String,
    /// Visible label; `^` marks the syslinux hotkey.
    pub long: String,
    /// Boot arguments appended after the common kernel options.
    pub extra: String,
    pub help: Option<String>,
    /// Kernel variant booted by this entry, if it boots one.
    pub kernel_index: Option<usize>,
    pub kind: EntryKind,
}

/// Well-known menu entry, used when the specification gives only a short name.
#[derive(Debug, Clone, Copy)]
pub struct KnownEntry {
    pub name: &'static str,
    /// Label prefix of the stanza.
    pub short: &'static str,
    pub long: &'static str,
    pub extra: &'static str,
    pub kind: EntryKind,
}

pub const KNOWN_ENTRIES: &[KnownEntry] = &[
    KnownEntry {
        name: "basic",
        short: "basic",
        long: "Installation Only (Text based)",
        extra: "basic nosplash 4",
        kind: EntryKind::Custom,
    },
    KnownEntry {
        name: "liveinst",
        short: "liveinst",
        long: "Installation Only",
        extra: "liveinst nosplash 4",
        kind: EntryKind::Custom,
    },
    KnownEntry {
        name: "autoinst",
        short: "autoinst",
        long: "Autoinstall (Deletes all existing content)",
        extra: "autoinst nosplash 4",
        kind: EntryKind::Custom,
    },
    KnownEntry {
        name: "netinst",
        short: "netinst",
        long: "Network Installation",
        extra: "netinst 4",
        kind: EntryKind::NetInstall,
    },
    KnownEntry {
        name: "verify",
        short: "check",
        long: "^Test this media and start",
        extra: "check",
        kind: EntryKind::Verify,
    },
];

pub fn known_entry(name: &str) -> Option<&'static KnownEntry> {
    KNOWN_ENTRIES.iter().find(|e| e.name == name)
}
