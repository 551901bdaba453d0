/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Passes over whole files and the standard compile pipeline.
//!
//! A [`Pass`] runs on a [`File`] and either succeeds or fails. Function
//! level stages are lifted to file level with [`FunctionPass`], and
//! [`Concat`] sequences passes, stopping at the first failure. The
//! standard pipeline returned by [`compile`] is an ordinary value;
//! callers are free to assemble their own.
//!
//! A failed pipeline leaves the file partially transformed. It must not
//! be fed to another pipeline run.

use std::io;

use crate::printer::{PrintError, Printer, Sink};
use crate::{
    bind, verify_physical, File, Function, Liveness, MachineEnv, RegAllocError, RegallocOptions,
};

/// An error that stops a pipeline.
#[derive(Debug)]
pub enum Error {
    RegAlloc(RegAllocError),
    Print(PrintError),
    /// Writing the rendered output failed.
    Write(io::Error),
    /// Everything was written but closing the sink failed.
    Close(io::Error),
    /// The output stage has already given up its sink.
    SinkReleased,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::RegAlloc(err) => write!(f, "register allocation failed: {}", err),
            Error::Print(err) => write!(f, "{}", err),
            Error::Write(err) => write!(f, "writing output failed: {}", err),
            Error::Close(err) => write!(f, "closing output failed: {}", err),
            Error::SinkReleased => write!(f, "output sink already released"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::RegAlloc(err) => Some(err),
            Error::Print(err) => Some(err),
            Error::Write(err) | Error::Close(err) => Some(err),
            Error::SinkReleased => None,
        }
    }
}

impl From<RegAllocError> for Error {
    fn from(err: RegAllocError) -> Self {
        Error::RegAlloc(err)
    }
}

impl From<PrintError> for Error {
    fn from(err: PrintError) -> Self {
        Error::Print(err)
    }
}

/// A processing pass over a file.
pub trait Pass {
    fn execute(&mut self, file: &mut File) -> Result<(), Error>;
}

/// A pass made of a function over the whole file.
pub struct FilePass<F>(pub F);

impl<F: FnMut(&mut File) -> Result<(), Error>> Pass for FilePass<F> {
    fn execute(&mut self, file: &mut File) -> Result<(), Error> {
        (self.0)(file)
    }
}

/// A pass that runs a function over every function of the file in
/// order, stopping at the first one that fails.
pub struct FunctionPass<F>(pub F);

impl<F: FnMut(&mut Function) -> Result<(), Error>> Pass for FunctionPass<F> {
    fn execute(&mut self, file: &mut File) -> Result<(), Error> {
        for func in file.functions_mut() {
            (self.0)(func)?;
        }
        Ok(())
    }
}

/// Passes run in order. The first error is returned as it is and no
/// later pass runs.
#[derive(Default)]
pub struct Concat {
    passes: Vec<Box<dyn Pass>>,
}

impl Concat {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Concat { passes }
    }

    pub fn push(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Pass for Concat {
    fn execute(&mut self, file: &mut File) -> Result<(), Error> {
        let n = self.passes.len();
        for (i, pass) in self.passes.iter_mut().enumerate() {
            trace!("pass {}/{}", i + 1, n);
            pass.execute(file)?;
        }
        Ok(())
    }
}

/// Compute liveness from scratch.
pub fn liveness(func: &mut Function) -> Result<(), Error> {
    func.liveness = Some(Liveness::compute(func));
    Ok(())
}

/// Allocate registers using the liveness stored by [`liveness`].
pub fn allocate_registers(
    env: MachineEnv,
    options: RegallocOptions,
) -> impl FnMut(&mut Function) -> Result<(), Error> {
    move |func| {
        func.allocation = None;
        let liveness = func.liveness.as_ref().ok_or(RegAllocError::MissingLiveness)?;
        let allocation = crate::allocate(func, liveness, &env, &options)?;
        func.allocation = Some(allocation);
        Ok(())
    }
}

/// Rewrite operands with the stored allocation. Nothing to do if there
/// is none.
pub fn bind_registers(func: &mut Function) -> Result<(), Error> {
    if let Some(allocation) = func.allocation.take() {
        bind(func, &allocation);
        func.allocation = Some(allocation);
    }
    Ok(())
}

/// Check that no virtual register survived binding.
pub fn verify_allocation(func: &mut Function) -> Result<(), Error> {
    verify_physical(func)?;
    Ok(())
}

/// The standard pipeline: liveness, allocation, binding, verification.
pub fn compile(env: &MachineEnv, options: &RegallocOptions) -> Concat {
    Concat::new(vec![
        Box::new(FunctionPass(liveness)),
        Box::new(FunctionPass(allocate_registers(env.clone(), *options))),
        Box::new(FunctionPass(bind_registers)),
        Box::new(FunctionPass(verify_allocation)),
    ])
}

/// Terminal stage: render the file and write it to a sink.
///
/// The sink is closed whatever happens, including when rendering or
/// writing fails. A write error is reported in preference to the close
/// error that may follow it. The sink is given up after the first run;
/// running again fails with [`Error::SinkReleased`].
pub struct Output<P: Printer, S: Sink> {
    printer: P,
    sink: Option<S>,
}

impl<P: Printer, S: Sink> Output<P, S> {
    pub fn new(printer: P, sink: S) -> Self {
        Output {
            printer,
            sink: Some(sink),
        }
    }
}

impl<P: Printer, S: Sink> Pass for Output<P, S> {
    fn execute(&mut self, file: &mut File) -> Result<(), Error> {
        let Some(mut sink) = self.sink.take() else {
            return Err(Error::SinkReleased);
        };

        let written = match self.printer.print(file) {
            Ok(bytes) => sink.write_all(&bytes).map_err(Error::Write),
            Err(err) => Err(Error::Print(err)),
        };
        let closed = sink.close();
        trace!("output: written = {:?}, closed = {:?}", written.is_ok(), closed.is_ok());

        written?;
        closed.map_err(Error::Close)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::printer::TextPrinter;
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;

    #[test]
    fn test_concat_fails_fast() {
        let ran = Rc::new(Cell::new([false; 3]));
        let mark = |i: usize| {
            let ran = ran.clone();
            move || {
                let mut r = ran.get();
                r[i] = true;
                ran.set(r);
            }
        };

        let p1 = mark(0);
        let p2 = mark(1);
        let p3 = mark(2);
        let mut pipeline = Concat::new(vec![
            Box::new(FilePass(move |_: &mut File| -> Result<(), Error> {
                p1();
                Ok(())
            })),
            Box::new(FilePass(move |_: &mut File| -> Result<(), Error> {
                p2();
                Err(Error::RegAlloc(RegAllocError::MissingLiveness))
            })),
            Box::new(FilePass(move |_: &mut File| -> Result<(), Error> {
                p3();
                Ok(())
            })),
        ]);

        let err = pipeline.execute(&mut File::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::RegAlloc(RegAllocError::MissingLiveness)
        ));
        assert_eq!(ran.get(), [true, true, false]);
    }

    #[test]
    fn test_function_pass_stops_at_first_error() {
        let mut file: File = ["a", "b", "c"].into_iter().map(Function::new).collect();
        let mut seen = vec![];
        let mut pass = FunctionPass(|func: &mut Function| -> Result<(), Error> {
            seen.push(func.name.clone());
            if func.name == "b" {
                return Err(Error::SinkReleased);
            }
            Ok(())
        });
        assert!(matches!(pass.execute(&mut file), Err(Error::SinkReleased)));
        drop(pass);
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_allocate_requires_liveness() {
        let mut file: File = [Function::new("f")].into_iter().collect();
        let mut pass = FunctionPass(allocate_registers(
            MachineEnv::default(),
            RegallocOptions::default(),
        ));
        assert!(matches!(
            pass.execute(&mut file),
            Err(Error::RegAlloc(RegAllocError::MissingLiveness))
        ));
    }

    #[derive(Default)]
    struct TestSink {
        fail_write: bool,
        fail_close: bool,
        written: Vec<u8>,
        closed: usize,
    }

    impl Sink for TestSink {
        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            if self.fail_write {
                return Err(io::Error::new(io::ErrorKind::Other, "write"));
            }
            self.written.extend_from_slice(buf);
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed += 1;
            if self.fail_close {
                return Err(io::Error::new(io::ErrorKind::Other, "close"));
            }
            Ok(())
        }
    }

    struct BrokenPrinter;

    impl Printer for BrokenPrinter {
        fn print(&self, _: &File) -> Result<Vec<u8>, PrintError> {
            Err(PrintError {
                function: "f".into(),
                message: "broken".into(),
            })
        }
    }

    #[test]
    fn test_output_writes_and_closes() {
        let mut sink = TestSink::default();
        let mut output = Output::new(TextPrinter, &mut sink);
        let mut file: File = [Function::new("f")].into_iter().collect();
        output.execute(&mut file).unwrap();
        assert!(matches!(output.execute(&mut file), Err(Error::SinkReleased)));
        drop(output);
        assert_eq!(sink.written, b"f:\n".to_vec());
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn test_output_closes_on_write_failure() {
        let mut sink = TestSink {
            fail_write: true,
            fail_close: true,
            ..TestSink::default()
        };
        let err = Output::new(TextPrinter, &mut sink)
            .execute(&mut File::new())
            .unwrap_err();
        match err {
            Error::Write(err) => assert_eq!(err.to_string(), "write"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn test_output_closes_on_print_failure() {
        let mut sink = TestSink::default();
        let err = Output::new(BrokenPrinter, &mut sink)
            .execute(&mut File::new())
            .unwrap_err();
        assert!(matches!(err, Error::Print(_)));
        assert!(sink.written.is_empty());
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn test_output_close_failure() {
        let mut sink = TestSink {
            fail_close: true,
            ..TestSink::default()
        };
        let err = Output::new(TextPrinter, &mut sink)
            .execute(&mut File::new())
            .unwrap_err();
        assert!(matches!(err, Error::Close(_)));
        assert_eq!(sink.closed, 1);
    }
}
