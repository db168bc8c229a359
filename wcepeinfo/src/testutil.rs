//! Synthetic images for tests.


/// A PE32 image with headers only: no sections, no data directories.
pub(crate) fn minimal_image(machine: u16, subsystem: u16, subsystem_version: (u16, u16), timestamp: u32) -> Vec<u8> {
    const PE_OFFSET: usize = 0x40;
    const OPTIONAL_HEADER_OFFSET: usize = PE_OFFSET + 4 + 20;

    fn put_u16(image: &mut [u8], offset: usize, value: u16) {
        image[offset..offset+2].copy_from_slice(&value.to_le_bytes());
    }
    fn put_u32(image: &mut [u8], offset: usize, value: u32) {
        image[offset..offset+4].copy_from_slice(&value.to_le_bytes());
    }

    let mut image = vec![0u8; 0x200];

    image[0..2].copy_from_slice(b"MZ");
    put_u32(&mut image, 0x3C, PE_OFFSET as u32);
    image[PE_OFFSET..PE_OFFSET+4].copy_from_slice(b"PE\0\0");

    put_u16(&mut image, PE_OFFSET + 4, machine);
    put_u32(&mut image, PE_OFFSET + 8, timestamp);
    put_u16(&mut image, PE_OFFSET + 20, 224);
    // EXECUTABLE_IMAGE | 32BIT_MACHINE
    put_u16(&mut image, PE_OFFSET + 22, 0x0102);

    let opt = OPTIONAL_HEADER_OFFSET;
    put_u16(&mut image, opt, 0x010B);
    image[opt + 2] = 6;
    image[opt + 3] = 1;
    put_u32(&mut image, opt + 28, 0x0001_0000);
    put_u32(&mut image, opt + 32, 0x1000);
    put_u32(&mut image, opt + 36, 0x200);
    put_u16(&mut image, opt + 48, subsystem_version.0);
    put_u16(&mut image, opt + 50, subsystem_version.1);
    put_u32(&mut image, opt + 56, 0x1000);
    put_u32(&mut image, opt + 60, 0x200);
    put_u16(&mut image, opt + 68, subsystem);
    put_u32(&mut image, opt + 92, 16);

    image
}
