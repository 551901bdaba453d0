/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Rendering allocated files and the byte sinks they are written to.

use std::io;

use crate::{verify_physical, File};

/// A function could not be rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrintError {
    pub function: String,
    pub message: String,
}

impl std::fmt::Display for PrintError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "cannot print {}: {}", self.function, self.message)
    }
}

impl std::error::Error for PrintError {}

/// Turns an allocated file into bytes.
pub trait Printer {
    fn print(&self, file: &File) -> Result<Vec<u8>, PrintError>;
}

/// Plain text through the `Display` impls of the IR, one function
/// after the other.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextPrinter;

impl Printer for TextPrinter {
    fn print(&self, file: &File) -> Result<Vec<u8>, PrintError> {
        for func in file.functions() {
            if let Err(err) = verify_physical(func) {
                return Err(PrintError {
                    function: func.name.clone(),
                    message: err.to_string(),
                });
            }
        }
        Ok(file.to_string().into_bytes())
    }
}

/// A byte destination that has to be closed once the output stage is
/// done with it.
pub trait Sink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

impl Sink for Vec<u8> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any [`io::Write`]. Closing flushes and drops the writer, so
/// a file handle is released right away.
#[derive(Debug)]
pub struct IoSink<W: io::Write> {
    writer: Option<W>,
}

impl<W: io::Write> IoSink<W> {
    pub fn new(writer: W) -> Self {
        IoSink {
            writer: Some(writer),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "sink already closed")
}

impl<W: io::Write> Sink for IoSink<W> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.writer {
            Some(writer) => writer.write_all(buf),
            None => Err(closed()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Err(closed()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Function, InstData, Operand, PReg, RegKind, VReg};

    #[test]
    fn test_text_printer_refuses_virtual() {
        let mut func = Function::new("f");
        func.push(InstData::new("ret", [Operand::reg_use(VReg::new(0, RegKind::Int))]));
        let file: File = [func].into_iter().collect();
        let err = TextPrinter.print(&file).unwrap_err();
        assert_eq!(err.function, "f");
    }

    #[test]
    fn test_text_printer() {
        let mut a = Function::new("a");
        a.push(InstData::new("ret", [Operand::reg_use(PReg::new(0, RegKind::Float))]));
        let b = Function::new("b");
        let file: File = [a, b].into_iter().collect();
        assert_eq!(
            TextPrinter.print(&file).unwrap(),
            b"a:\n\tret p0f\n\nb:\n".to_vec()
        );
    }

    #[test]
    fn test_io_sink_close() {
        let mut sink = IoSink::new(Vec::new());
        sink.write_all(b"x").unwrap();
        assert!(!sink.is_closed());
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(sink.write_all(b"y").is_err());
        assert!(sink.close().is_err());
    }
}
