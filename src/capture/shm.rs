//! Scoped ownership for SysV shared memory resources.
//!
//! Both guards are move-only, release exactly once, and treat their sentinel
//! state as "nothing to release" so dropping a never-acquired guard is a no-op.

use std::io;
use std::ptr;

/// Owns a shared memory segment id. Marks the segment for removal on release.
#[derive(Debug)]
pub struct ShmId {
    id: libc::c_int,
}

const INVALID_ID: libc::c_int = -1;

impl ShmId {
    /// A guard holding no segment.
    pub const fn invalid() -> Self {
        Self { id: INVALID_ID }
    }

    /// Allocate a private segment of `size` bytes.
    pub fn alloc(size: usize) -> io::Result<Self> {
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { id })
    }

    pub fn raw(&self) -> libc::c_int {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.id != INVALID_ID
    }

    /// Mark the segment for removal. Idempotent; safe while mappings remain
    /// (the kernel removes the segment once the last one detaches).
    pub fn release(&mut self) {
        if self.id != INVALID_ID {
            unsafe {
                libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut());
            }
            self.id = INVALID_ID;
        }
    }
}

impl Drop for ShmId {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns a mapping of a shared memory segment into this process.
#[derive(Debug)]
pub struct ShmMapping {
    addr: *mut libc::c_void,
}

// The pointer is only dereferenced through `copy_out` on whichever thread
// owns the guard; the segment itself is process-shared memory.
unsafe impl Send for ShmMapping {}

impl ShmMapping {
    /// A guard holding no mapping.
    pub fn detached() -> Self {
        Self {
            addr: INVALID_ID as isize as *mut libc::c_void,
        }
    }

    /// Map `id`'s segment into the process.
    pub fn map(id: &ShmId) -> io::Result<Self> {
        let addr = unsafe { libc::shmat(id.raw(), ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { addr })
    }

    pub fn is_mapped(&self) -> bool {
        self.addr as isize != -1
    }

    /// Copy `len` bytes out of the mapping into a fresh buffer.
    ///
    /// `len` must not exceed the mapped segment's size.
    pub fn copy_out(&self, len: usize) -> Vec<u8> {
        debug_assert!(self.is_mapped());
        unsafe { std::slice::from_raw_parts(self.addr as *const u8, len) }.to_vec()
    }

    /// Detach the mapping. Idempotent.
    pub fn release(&mut self) {
        if self.is_mapped() {
            unsafe {
                libc::shmdt(self.addr);
            }
            self.addr = INVALID_ID as isize as *mut libc::c_void;
        }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        self.release();
    }
}
