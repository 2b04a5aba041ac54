use std::io::Read;

macro_rules! define_read_le_methods {
    { $($name:ident -> $ret:ty;)* } => {
        $(fn $name(&mut self) -> ::std::io::Result<$ret> {
            let mut buf = [0u8; ::std::mem::size_of::<$ret>()];
            self.read_exact(&mut buf)?;
            Ok(<$ret>::from_le_bytes(buf))
        })*
    };
}

pub trait ReadExt: Read {
    define_read_le_methods! {
        read_u32_le -> u32;
    }

    fn read_n_exact<const N: usize>(&mut self) -> std::io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> ReadExt for R {}
