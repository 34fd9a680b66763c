//! Registry of loaded code modules and their unwind tables.
//!
//! Built once by [initialize] and never modified afterwards, so walkers
//! (including ones running in signal handlers) read it without locking via
//! [get].

use crate::dwarf::{build_unwind_table, find_rule, DwarfError, EhFrameHeader, Section, UnwindRule};
use crate::dyld::{self, ObjectInfo};
use crate::utils::AddressRange;
use once_cell::sync::OnceCell;

static CODE_CACHE: OnceCell<CodeCache> = OnceCell::new();

/// A loaded executable or shared library.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub image_base: usize,
    pub text: AddressRange,
    table: Vec<UnwindRule>,
}

impl Module {
    /// `table` must be sorted by `loc`.
    pub fn new(name: String, image_base: usize, text: AddressRange, table: Vec<UnwindRule>) -> Self {
        Self {
            name,
            image_base,
            text,
            table,
        }
    }

    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        self.text.contains(address)
    }

    #[inline]
    pub fn table(&self) -> &[UnwindRule] {
        &self.table
    }

    /// The rule covering `pc`, or the frame-pointer rule if none does.
    #[inline]
    pub fn find_rule(&self, pc: usize) -> UnwindRule {
        if pc < self.image_base {
            return UnwindRule::DEFAULT;
        }
        find_rule(&self.table, (pc - self.image_base) as u32)
    }
}

#[derive(Debug, Default)]
pub struct CodeCache {
    modules: Vec<Module>,
}

impl CodeCache {
    pub fn from_modules(mut modules: Vec<Module>) -> Self {
        modules.sort_by_key(|m| m.text.start);
        Self { modules }
    }

    /// The module whose text contains `address`.
    pub fn lookup(&self, address: usize) -> Option<&Module> {
        let idx = self.modules.partition_point(|m| m.text.start <= address);
        if idx == 0 {
            return None;
        }
        let module = &self.modules[idx - 1];
        if module.contains(address) {
            Some(module)
        } else {
            None
        }
    }

    #[inline]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }
}

/// Enumerates the loaded modules on first call; later calls return the same
/// cache.
pub fn initialize() -> &'static CodeCache {
    CODE_CACHE.get_or_init(|| {
        let modules: Vec<Module> = dyld::objects().into_iter().map(load_module).collect();
        log::info!("registered {} modules", modules.len());
        CodeCache::from_modules(modules)
    })
}

/// The cache, if [initialize] has completed. Never initializes.
#[inline]
pub fn get() -> Option<&'static CodeCache> {
    CODE_CACHE.get()
}

fn load_module(object: ObjectInfo) -> Module {
    let table = match object.eh_frame_hdr {
        Some(hdr) => match unsafe { parse_table(&object, hdr) } {
            Ok(table) => table,
            Err(err) => {
                log::warn!("failed to parse unwind table of {}: {}", object.name, err);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    log::debug!("{}: {} unwind rules", object.name, table.len());
    Module::new(object.name, object.image_base, object.text, table)
}

/// # Safety
///
/// `hdr` and the segments of `object` must be mapped for the rest of the
/// process.
unsafe fn parse_table(object: &ObjectInfo, hdr: AddressRange) -> Result<Vec<UnwindRule>, DwarfError> {
    let header = Section::from_raw(hdr.start, hdr.len());
    let eh_frame = EhFrameHeader::decode(header)?.eh_frame;
    let segment = object
        .segment_of(eh_frame)
        .ok_or(DwarfError::OutOfSection(eh_frame))?;
    let eh_frame = Section::from_raw(eh_frame, segment.end - eh_frame);
    build_unwind_table(header, eh_frame, object.image_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::{CfaBase, FpRule, DW_EH_PE_OMIT, DW_EH_PE_UDATA4};

    fn module(name: &str, start: usize, end: usize, table: Vec<UnwindRule>) -> Module {
        Module::new(name.to_string(), start, AddressRange::new(start, end), table)
    }

    #[test]
    fn test_lookup() {
        let cache = CodeCache::from_modules(vec![
            module("b", 0x5000, 0x6000, vec![]),
            module("a", 0x1000, 0x2000, vec![]),
        ]);
        assert_eq!(cache.modules()[0].name, "a");
        assert!(cache.lookup(0).is_none());
        assert!(cache.lookup(0xfff).is_none());
        assert_eq!(cache.lookup(0x1000).unwrap().name, "a");
        assert_eq!(cache.lookup(0x1fff).unwrap().name, "a");
        assert!(cache.lookup(0x2000).is_none());
        assert_eq!(cache.lookup(0x5800).unwrap().name, "b");
        assert!(cache.lookup(usize::MAX).is_none());
    }

    #[test]
    fn test_module_find_rule() {
        let sp16 = UnwindRule {
            loc: 0x500,
            cfa_base: CfaBase::Sp,
            cfa_offset: 16,
            fp: FpRule::Unchanged,
        };
        let m = module("m", 0x1000, 0x2000, vec![sp16]);
        assert_eq!(m.find_rule(0x1500), sp16);
        assert_eq!(m.find_rule(0x1fff), sp16);
        assert_eq!(m.find_rule(0x1100), UnwindRule::DEFAULT.at(0x100));
        assert_eq!(m.find_rule(0x10), UnwindRule::DEFAULT);
    }

    #[test]
    fn test_load_module_with_broken_table() {
        // Version 3 is not a valid .eh_frame_hdr.
        let hdr = vec![3u8, 0, 0, 0, 0, 0, 0, 0];
        let start = hdr.as_ptr() as usize;
        let object = ObjectInfo {
            name: "broken".to_string(),
            image_base: 0x1000,
            text: AddressRange::new(0x1000, 0x2000),
            eh_frame_hdr: Some(AddressRange::new(start, start + hdr.len())),
            ..ObjectInfo::default()
        };
        let m = load_module(object.clone());
        assert_eq!(m.name, "broken");
        assert_eq!(m.text, AddressRange::new(0x1000, 0x2000));
        assert!(m.table().is_empty());
        assert_eq!(m.find_rule(0x1500), UnwindRule::DEFAULT.at(0x500));
        assert!(UnwindRule::DEFAULT.same_unwind(&m.find_rule(0x1fff)));

        // A readable header whose .eh_frame lies in no loaded segment.
        let hdr = vec![1u8, DW_EH_PE_UDATA4, DW_EH_PE_OMIT, DW_EH_PE_OMIT, 0x10, 0, 0, 0];
        let start = hdr.as_ptr() as usize;
        let m = load_module(ObjectInfo {
            eh_frame_hdr: Some(AddressRange::new(start, start + hdr.len())),
            ..object
        });
        assert!(m.table().is_empty());

        let m = load_module(ObjectInfo::default());
        assert!(m.table().is_empty());
    }

    #[test]
    fn test_initialize() {
        let cache = initialize();
        assert!(std::ptr::eq(cache, initialize()));
        assert!(std::ptr::eq(cache, get().unwrap()));
        assert!(cache.lookup(0).is_none());

        #[cfg(target_os = "linux")]
        {
            let m = cache.lookup(test_initialize as usize).unwrap();
            assert!(!m.table().is_empty());
        }
    }
}
