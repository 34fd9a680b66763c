use crate::dyld::{ObjectInfo, Objects, MAX_OBJECTS_LEN};
use crate::utils::AddressRange;
use std::ffi::CStr;
use std::slice;

const PF_X: u32 = 1;

/// Returns an [ObjectInfo] list of the executable and every library
/// dynamically loaded by the current process.
pub fn objects() -> Objects {
    let mut data = Objects::new();
    unsafe {
        libc::dl_iterate_phdr(Some(callback), &mut data as *mut _ as *mut libc::c_void);
    }
    data
}

fn object_name(name: &CStr) -> String {
    // The `dlpi_name` of the current executable is an empty string.
    if name.to_bytes().is_empty() {
        return std::env::current_exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    name.to_string_lossy().into_owned()
}

extern "C" fn callback(info: *mut libc::dl_phdr_info, _size: libc::size_t, data: *mut libc::c_void) -> libc::c_int {
    unsafe {
        let data = &mut *(data as *mut Objects);
        let info = &*info;
        if info.dlpi_phnum == 0 || info.dlpi_phdr.is_null() {
            return 0;
        }
        let name = if info.dlpi_name.is_null() {
            String::new()
        } else {
            object_name(CStr::from_ptr(info.dlpi_name))
        };
        let base = info.dlpi_addr as usize;
        let mut object = ObjectInfo {
            name,
            image_base: base,
            ..Default::default()
        };
        let hdrs = slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
        for hdr in hdrs {
            let start = base + hdr.p_vaddr as usize;
            match hdr.p_type {
                libc::PT_LOAD => {
                    if hdr.p_flags & PF_X != 0 {
                        let text = AddressRange::new(start, start + hdr.p_memsz as usize);
                        object.text = object.text.union(&text);
                    }
                    object
                        .segments
                        .push(AddressRange::new(start, start + hdr.p_filesz as usize));
                }
                libc::PT_GNU_EH_FRAME => {
                    object.eh_frame_hdr = Some(AddressRange::new(start, start + hdr.p_memsz as usize));
                }
                _ => {}
            }
        }
        if !object.text.is_empty() {
            if data.len() == MAX_OBJECTS_LEN {
                log::debug!("more than {} objects loaded, spilling to the heap", MAX_OBJECTS_LEN);
            }
            data.push(object);
        }
        0
    }
}
