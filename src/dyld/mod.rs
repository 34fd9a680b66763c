//! Enumeration of the code objects loaded into the process.

use crate::utils::AddressRange;
use smallvec::SmallVec;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::objects;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::objects;

pub const MAX_OBJECTS_LEN: usize = 128;

pub type Objects = SmallVec<[ObjectInfo; MAX_OBJECTS_LEN]>;

/// Real loaded addresses of one object in virtual memory space.
#[derive(Debug, Default, Clone)]
pub struct ObjectInfo {
    /// Path of the object. The main executable reports its own path.
    pub name: String,
    /// Load bias added to link-time addresses.
    pub image_base: usize,
    /// Union of the executable segments.
    pub text: AddressRange,
    /// File-backed extent of every loadable segment.
    pub segments: SmallVec<[AddressRange; 8]>,
    pub eh_frame_hdr: Option<AddressRange>,
}

impl ObjectInfo {
    /// The loaded segment containing `address`.
    pub fn segment_of(&self, address: usize) -> Option<AddressRange> {
        self.segments.iter().copied().find(|s| s.contains(address))
    }
}
