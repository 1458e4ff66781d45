//! undname is a crate for Rust that can decode C++ symbols which use the
//! MSVC mangling scheme back into a readable declaration.  These are
//! emitted by the Microsoft C++ compiler for Windows as well as some
//! others.
//!
//! # Example
//!
//! ```
//! use undname;
//! let flags = undname::DemangleFlags::COMPLETE;
//! let result = undname::demangle("?x@ns@@3HA", flags).unwrap();
//! assert_eq!(result, "int ns::x");
//! ```
//!
//! # Behavior
//!
//! Its functionality is similar to `undname` on Windows and the underlying
//! `UnDecorateSymbolName` function.  Since Microsoft does not document the
//! mangling scheme this is likely not to be entirely accurate.  Symbols
//! that do not start with `?` are treated as already demangled and are
//! echoed back unchanged.
//!
//! # License
//!
//! This undname is dual licensed under the MIT and the University of
//! Illinois Open Source Licenses.

#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]

use bitflags::bitflags;

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::io;
use std::io::Write;
use std::marker::PhantomData;
use std::ops::Index;
use std::result;
use std::string::FromUtf8Error;

pub struct Error {
    repr: ErrorRepr,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.repr, f)
    }
}

#[derive(Debug)]
pub enum ErrorRepr {
    FromUtf8(FromUtf8Error),
    Io(io::Error),
    ParseError(Cow<'static, str>, String, usize),
}

impl Error {
    fn new_parse_error(s: Cow<'static, str>, remaining: &[u8], offset: usize) -> Error {
        let context = if remaining.len() > 20 {
            format!("{}...", String::from_utf8_lossy(&remaining[..20]))
        } else {
            String::from_utf8_lossy(remaining).into_owned()
        };
        Error {
            repr: ErrorRepr::ParseError(s, context, offset),
        }
    }

    /// Returns the offset in the input where the error happened.
    pub fn offset(&self) -> Option<usize> {
        match self.repr {
            ErrorRepr::ParseError(_, _, offset) => Some(offset),
            _ => None,
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error {
            repr: ErrorRepr::FromUtf8(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            repr: ErrorRepr::Io(err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.repr {
            ErrorRepr::FromUtf8(ref e) => Some(&*e),
            ErrorRepr::Io(ref e) => Some(&*e),
            ErrorRepr::ParseError(..) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            ErrorRepr::FromUtf8(ref e) => fmt::Display::fmt(e, f),
            ErrorRepr::Io(ref e) => fmt::Display::fmt(e, f),
            ErrorRepr::ParseError(ref msg, ref context, offset) => {
                write!(f, "{} (offset: {}, remaining: {:?})", msg, offset, context)
            }
        }
    }
}

type Result<T> = result::Result<T, Error>;

bitflags! {
    pub struct StorageClass: u8 {
        const CONST     = 0b0000_0001;
        const VOLATILE  = 0b0000_0010;
        const FAR       = 0b0000_0100;
        const HUGE      = 0b0000_1000;
        const UNALIGNED = 0b0001_0000;
        const RESTRICT  = 0b0010_0000;
    }
}

bitflags! {
    pub struct FuncClass: u8 {
        const PUBLIC    = 0b0000_0001;
        const PROTECTED = 0b0000_0010;
        const PRIVATE   = 0b0000_0100;
        const GLOBAL    = 0b0000_1000;
        const STATIC    = 0b0001_0000;
        const VIRTUAL   = 0b0010_0000;
        const FFAR      = 0b0100_0000;
    }
}

bitflags! {
    pub struct DemangleFlags: u32 {
        /// Enable full undecoration.
        const COMPLETE = 0x0;
        /// Undecorate only the qualified symbol name, without its type.
        const NAME_ONLY = 0x1;
        /// Insert a space after each comma.
        const SPACE_AFTER_COMMA = 0x2;
    }
}

// Calling conventions
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CallingConv {
    Cdecl,
    Pascal,
    Thiscall,
    Stdcall,
    Fastcall,
}

// A non-owning view over the mangled input.  Identifier slices handed out
// by the parser point back into the buffer behind this cursor.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Cursor<'a> {
        Cursor { buf, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn starts_with(&self, s: &[u8]) -> bool {
        self.rest().starts_with(s)
    }

    fn starts_with_digit(&self) -> bool {
        match self.peek() {
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn get(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    // Pushes back the byte last returned by `get`.  The end-of-input
    // sentinel cannot be pushed back.
    fn unget(&mut self, c: Option<u8>) {
        if c.is_some() {
            debug_assert!(self.pos > 0);
            self.pos -= 1;
        }
    }

    fn trim(&mut self, n: usize) {
        debug_assert!(n <= self.buf.len() - self.pos);
        self.pos += n;
    }

    fn consume(&mut self, s: &[u8]) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }
}

/// A stable handle to a node owned by an [`Arena`].
#[derive(Debug)]
pub struct Key<T>(u32, PhantomData<T>);

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Key<T> {}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> Key<T> {
    fn new(index: u32) -> Self {
        Key(index, PhantomData)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Allocation-order node store.  Acquisition is an O(1) push; nodes are
/// never released one by one, the whole store drops at once after the
/// writer pass is done with it.
#[derive(Debug)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    fn alloc(&mut self, value: T) -> Key<T> {
        let idx = self.items.len() as u32;
        self.items.push(value);
        Key::new(idx)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Index<Key<T>> for Arena<T> {
    type Output = T;

    fn index(&self, key: Key<T>) -> &Self::Output {
        &self.items[key.index() as usize]
    }
}

// One component of a qualified name.  Constructors and destructors keep
// their `?0`/`?1` marker as an identifier prefix and are rewritten by the
// writer.
#[derive(Clone, PartialEq)]
pub struct Name<'a> {
    pub ident: &'a [u8],
    pub template_params: Params<'a>,
}

impl<'a> fmt::Debug for Name<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Name")
            .field("ident", &String::from_utf8_lossy(self.ident))
            .field("template_params", &self.template_params)
            .finish()
    }
}

/// A qualified name, outermost component first.
#[derive(Clone, Debug, PartialEq)]
pub struct NameSequence<'a> {
    pub names: Vec<Key<Name<'a>>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params<'a> {
    pub types: Vec<Key<Type<'a>>>,
}

// The type class.  Mangled symbols are first parsed into a graph of these
// and then converted to a string.  Children are handles into the type
// arena of the owning [`ParseResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum Type<'a> {
    Unknown,
    None,
    MemberFunction(FuncClass, CallingConv, Params<'a>, StorageClass, Key<Type<'a>>),
    NonMemberFunction(CallingConv, Params<'a>, Key<Type<'a>>),
    Ptr(Key<Type<'a>>, StorageClass),
    Ref(Key<Type<'a>>, StorageClass),
    Array(i32, Key<Type<'a>>, StorageClass),

    Struct(NameSequence<'a>, StorageClass),
    Union(NameSequence<'a>, StorageClass),
    Class(NameSequence<'a>, StorageClass),
    Enum(NameSequence<'a>, StorageClass),

    Void(StorageClass),
    Bool(StorageClass),
    Char(StorageClass),
    Schar(StorageClass),
    Uchar(StorageClass),
    Short(StorageClass),
    Ushort(StorageClass),
    Int(StorageClass),
    Uint(StorageClass),
    Long(StorageClass),
    Ulong(StorageClass),
    Llong(StorageClass),
    Ullong(StorageClass),
    Wchar(StorageClass),
    Float(StorageClass),
    Double(StorageClass),
    Ldouble(StorageClass),
    Varargs,
}

/// The demangled AST.  Owns every node; identifier slices borrow from the
/// input the symbol was parsed from.
#[derive(Debug)]
pub struct ParseResult<'a> {
    pub types: Arena<Type<'a>>,
    pub names: Arena<Name<'a>>,
    pub symbol: NameSequence<'a>,
    pub symbol_type: Key<Type<'a>>,
}

// The parser.  read_* functions advance the cursor as they go and build
// nodes in the arenas.
struct ParserState<'a> {
    cursor: Cursor<'a>,

    types: Arena<Type<'a>>,
    names: Arena<Name<'a>>,

    // The first 10 names in a mangled symbol can be back-referenced by
    // the digits 0-9.  This table is global to one parse.
    memorized_names: Vec<Key<Name<'a>>>,
}

impl<'a> ParserState<'a> {
    fn fail(&self, s: &'static str) -> Error {
        Error::new_parse_error(Cow::Borrowed(s), self.cursor.rest(), self.cursor.offset())
    }

    fn fail_args(&self, args: fmt::Arguments<'_>) -> Error {
        Error::new_parse_error(
            Cow::Owned(format!("{}", args)),
            self.cursor.rest(),
            self.cursor.offset(),
        )
    }

    fn parse(mut self) -> Result<ParseResult<'a>> {
        // MSVC-style mangled symbols start with '?'.  Anything else is
        // taken to be already demangled and is echoed back unchanged.
        if !self.cursor.consume(b"?") {
            let ident = self.cursor.rest();
            let name = self.names.alloc(Name {
                ident,
                template_params: Params::default(),
            });
            let symbol_type = self.types.alloc(Type::Unknown);
            return Ok(ParseResult {
                types: self.types,
                names: self.names,
                symbol: NameSequence { names: vec![name] },
                symbol_type,
            });
        }

        // What follows is the symbol name, which may include namespaces
        // or class names, and then the encoding of its type.
        let symbol = self.read_name()?;

        let symbol_type = if self.cursor.consume(b"3") {
            // A variable.  The trailing bytes encode its own storage
            // class and do not change the declaration.
            self.read_var_type(StorageClass::empty())?
        } else if self.cursor.consume(b"Y") {
            self.read_non_member_function()?
        } else if let Some(c) = self.cursor.get() {
            self.read_member_function(c)?
        } else {
            // Some symbols carry no type encoding at all.
            self.types.alloc(Type::None)
        };

        Ok(ParseResult {
            types: self.types,
            names: self.names,
            symbol,
            symbol_type,
        })
    }

    fn read_digit(&mut self) -> Option<u8> {
        if self.cursor.starts_with_digit() {
            self.cursor.get().map(|c| c - b'0')
        } else {
            None
        }
    }

    fn expect(&mut self, s: &[u8]) -> Result<()> {
        if self.cursor.consume(s) {
            Ok(())
        } else {
            Err(self.fail_args(format_args!(
                "{} expected, but got {}",
                String::from_utf8_lossy(s),
                String::from_utf8_lossy(self.cursor.rest())
            )))
        }
    }

    // Sometimes numbers are encoded in mangled symbols.  For example,
    // "int (*x)[20]" is a valid C type (x is a pointer to an array of
    // length 20), so we need some way to embed numbers as part of symbols.
    //
    // <number>               ::= [?] <non-negative integer>
    //
    // <non-negative integer> ::= <decimal digit> # when 1 <= Number <= 10
    //                        ::= <hex digit>+ @  # when Number == 0 or >= 10
    //
    // <hex-digit>            ::= [A-P]           # A = 0, B = 1, ...
    fn read_number(&mut self) -> Result<i32> {
        let neg = self.cursor.consume(b"?");

        if let Some(digit) = self.read_digit() {
            let ret = i32::from(digit) + 1;
            return Ok(if neg { -ret } else { ret });
        }

        let mut ret: i32 = 0;
        loop {
            match self.cursor.peek() {
                Some(b'@') => {
                    self.cursor.trim(1);
                    return Ok(if neg { -ret } else { ret });
                }
                Some(c) if (b'A'..=b'P').contains(&c) => {
                    self.cursor.trim(1);
                    ret = (ret << 4) + i32::from(c - b'A');
                }
                _ => return Err(self.fail("bad number")),
            }
        }
    }

    // Reads an identifier up to and including the next '@'.
    fn read_string(&mut self) -> Result<&'a [u8]> {
        match self.cursor.rest().iter().position(|&c| c == b'@') {
            Some(pos) => {
                let ret = &self.cursor.rest()[..pos];
                self.cursor.trim(pos + 1);
                Ok(ret)
            }
            None => Err(self.fail("read_string: missing '@'")),
        }
    }

    // The first 10 identifiers seen can be back-referenced by the digits
    // 0-9 later on.  Memorize them, without duplicates.
    fn memorize_name(&mut self, key: Key<Name<'a>>) {
        let ident = self.names[key].ident;
        let seen = self
            .memorized_names
            .iter()
            .any(|&k| self.names[k].ident == ident);
        if self.memorized_names.len() < 10 && !seen {
            self.memorized_names.push(key);
        }
    }

    // Parses a name in the form of A@B@C@@, which encodes C::B::A.  The
    // collected sequence is flipped into outermost-first order.
    fn read_name(&mut self) -> Result<NameSequence<'a>> {
        let mut names = Vec::new();
        while !self.cursor.consume(b"@") {
            let key = if let Some(i) = self.read_digit() {
                let i = i as usize;
                if i >= self.memorized_names.len() {
                    return Err(self.fail("name reference too large"));
                }
                self.memorized_names[i]
            } else if self.cursor.consume(b"?$") {
                // Template names carry their own parameter list.  Their
                // identifier does not enter the back-reference table.
                self.read_template_name()?
            } else if self.cursor.starts_with(b"?0?$") || self.cursor.starts_with(b"?1?$") {
                // A structor of a template class.  The marker fuses with
                // the template component into a single identifier.
                let rest = self.cursor.rest();
                self.cursor.trim(4);
                let tail = self.read_string()?;
                let ident = &rest[..4 + tail.len()];
                let template_params = self.read_template_params()?;
                self.names.alloc(Name {
                    ident,
                    template_params,
                })
            } else {
                let ident = self.read_string()?;
                let key = self.names.alloc(Name {
                    ident,
                    template_params: Params::default(),
                });
                self.memorize_name(key);
                key
            };
            names.push(key);
        }
        names.reverse();
        Ok(NameSequence { names })
    }

    fn read_template_name(&mut self) -> Result<Key<Name<'a>>> {
        let ident = self.read_string()?;
        let template_params = self.read_template_params()?;
        Ok(self.names.alloc(Name {
            ident,
            template_params,
        }))
    }

    fn read_template_params(&mut self) -> Result<Params<'a>> {
        let params = self.read_params()?;
        self.expect(b"@")?;
        Ok(params)
    }

    // One parameter list.  The type back-reference table lives on this
    // frame, so each list indexes only its own types.
    fn read_params(&mut self) -> Result<Params<'a>> {
        let mut backrefs: Vec<Key<Type<'a>>> = Vec::with_capacity(10);
        let mut types = Vec::new();

        while !self.cursor.starts_with(b"@")
            && !self.cursor.starts_with(b"Z")
            && !self.cursor.is_empty()
        {
            if let Some(n) = self.read_digit() {
                let n = n as usize;
                if n >= backrefs.len() {
                    return Err(self.fail_args(format_args!("invalid backreference: {}", n)));
                }
                // A back-reference duplicates the referenced type.  The
                // copy is shallow and shares its children.
                let dup = self.types[backrefs[n]].clone();
                types.push(self.types.alloc(dup));
                continue;
            }

            let start = self.cursor.offset();
            let param = self.read_var_type(StorageClass::empty())?;

            // Single-letter codes are cheaper to re-parse than to index.
            if self.cursor.offset() - start > 1 && backrefs.len() < 10 {
                backrefs.push(param);
            }
            types.push(param);
        }

        Ok(Params { types })
    }

    // A function parameter list together with its terminator.  A lone X
    // is (void); a parameter-position Z is varargs, while the final Z
    // closes the function encoding.
    fn read_func_params(&mut self) -> Result<Params<'a>> {
        let mut params = if self.cursor.consume(b"X") {
            Params {
                types: vec![self.types.alloc(Type::Void(StorageClass::empty()))],
            }
        } else {
            self.read_params()?
        };

        if self.cursor.consume(b"ZZ") {
            params.types.push(self.types.alloc(Type::Varargs));
        } else if !self.cursor.consume(b"Z") {
            self.expect(b"@")?;
            self.cursor.consume(b"Z");
        }

        Ok(params)
    }

    fn read_calling_conv(&mut self) -> Result<CallingConv> {
        let c = self.cursor.get();
        match c {
            Some(b'A') | Some(b'B') => Ok(CallingConv::Cdecl),
            Some(b'C') => Ok(CallingConv::Pascal),
            Some(b'E') => Ok(CallingConv::Thiscall),
            Some(b'G') => Ok(CallingConv::Stdcall),
            Some(b'I') => Ok(CallingConv::Fastcall),
            _ => {
                self.cursor.unget(c);
                Err(self.fail("unknown calling convention"))
            }
        }
    }

    fn read_func_class(&mut self, c: u8) -> Result<FuncClass> {
        Ok(match c {
            b'A' => FuncClass::PRIVATE,
            b'B' => FuncClass::PRIVATE | FuncClass::FFAR,
            b'C' => FuncClass::PRIVATE | FuncClass::STATIC,
            b'D' => FuncClass::PRIVATE | FuncClass::STATIC | FuncClass::FFAR,
            b'E' => FuncClass::PRIVATE | FuncClass::VIRTUAL,
            b'F' => FuncClass::PRIVATE | FuncClass::VIRTUAL | FuncClass::FFAR,
            b'I' => FuncClass::PROTECTED,
            b'J' => FuncClass::PROTECTED | FuncClass::FFAR,
            b'K' => FuncClass::PROTECTED | FuncClass::STATIC,
            b'L' => FuncClass::PROTECTED | FuncClass::STATIC | FuncClass::FFAR,
            b'M' => FuncClass::PROTECTED | FuncClass::VIRTUAL,
            b'N' => FuncClass::PROTECTED | FuncClass::VIRTUAL | FuncClass::FFAR,
            b'Q' => FuncClass::PUBLIC,
            b'R' => FuncClass::PUBLIC | FuncClass::FFAR,
            b'S' => FuncClass::PUBLIC | FuncClass::STATIC,
            b'T' => FuncClass::PUBLIC | FuncClass::STATIC | FuncClass::FFAR,
            b'U' => FuncClass::PUBLIC | FuncClass::VIRTUAL,
            b'V' => FuncClass::PUBLIC | FuncClass::VIRTUAL | FuncClass::FFAR,
            b'W' => FuncClass::PUBLIC | FuncClass::VIRTUAL,
            b'X' => FuncClass::PUBLIC | FuncClass::VIRTUAL | FuncClass::FFAR,
            b'Y' => FuncClass::GLOBAL,
            b'Z' => FuncClass::GLOBAL | FuncClass::FFAR,
            _ => return Err(self.fail("unknown func class")),
        })
    }

    // The cv-qualification of a member function's `this`.
    fn read_member_qualifiers(&mut self) -> StorageClass {
        let c = self.cursor.get();
        match c {
            Some(b'A') => StorageClass::empty(),
            Some(b'B') => StorageClass::CONST,
            Some(b'C') => StorageClass::VOLATILE,
            Some(b'D') => StorageClass::CONST | StorageClass::VOLATILE,
            _ => {
                self.cursor.unget(c);
                StorageClass::empty()
            }
        }
    }

    // The storage class of a pointee.  An unrecognized byte belongs to
    // whatever comes next and is left in place.
    fn read_storage_class(&mut self) -> StorageClass {
        let c = self.cursor.get();
        match c {
            Some(b'A') => StorageClass::empty(),
            Some(b'B') => StorageClass::CONST,
            Some(b'C') => StorageClass::VOLATILE,
            Some(b'D') => StorageClass::CONST | StorageClass::VOLATILE,
            Some(b'E') => StorageClass::FAR,
            Some(b'F') => StorageClass::CONST | StorageClass::FAR,
            Some(b'G') => StorageClass::VOLATILE | StorageClass::FAR,
            Some(b'H') => StorageClass::CONST | StorageClass::VOLATILE | StorageClass::FAR,
            _ => {
                self.cursor.unget(c);
                StorageClass::empty()
            }
        }
    }

    fn read_storage_class_for_return(&mut self) -> Result<StorageClass> {
        if !self.cursor.consume(b"?") {
            return Ok(StorageClass::empty());
        }

        match self.cursor.get() {
            Some(b'A') => Ok(StorageClass::empty()),
            Some(b'B') => Ok(StorageClass::CONST),
            Some(b'C') => Ok(StorageClass::VOLATILE),
            Some(b'D') => Ok(StorageClass::CONST | StorageClass::VOLATILE),
            _ => Err(self.fail("unknown storage class")),
        }
    }

    // <return-type> ::= <type>
    //               ::= @ # structors have no declared return type
    fn read_func_return_type(&mut self, sc: StorageClass) -> Result<Key<Type<'a>>> {
        if self.cursor.consume(b"@") {
            Ok(self.types.alloc(Type::None))
        } else {
            self.read_var_type(sc)
        }
    }

    fn read_non_member_function(&mut self) -> Result<Key<Type<'a>>> {
        let calling_conv = self.read_calling_conv()?;
        let sc = self.read_storage_class_for_return()?;
        let return_type = self.read_var_type(sc)?;
        let params = self.read_func_params()?;
        Ok(self
            .types
            .alloc(Type::NonMemberFunction(calling_conv, params, return_type)))
    }

    fn read_member_function(&mut self, c: u8) -> Result<Key<Type<'a>>> {
        let func_class = self.read_func_class(c)?;
        // All 'this' pointers are 64-bit.
        self.expect(b"E")?;
        let access_class = self.read_member_qualifiers();
        let calling_conv = self.read_calling_conv()?;
        let sc = self.read_storage_class_for_return()?;
        let return_type = self.read_func_return_type(sc)?;
        let params = self.read_func_params()?;
        Ok(self.types.alloc(Type::MemberFunction(
            func_class,
            calling_conv,
            params,
            access_class,
            return_type,
        )))
    }

    // Reads a variable type.
    fn read_var_type(&mut self, sc: StorageClass) -> Result<Key<Type<'a>>> {
        if self.cursor.consume(b"W4") {
            let name = self.read_name()?;
            return Ok(self.types.alloc(Type::Enum(name, sc)));
        }

        if self.cursor.consume(b"P6A") {
            // A pointer to a function.  Its parameter list runs to `@Z`,
            // or to a lone `Z` on truncated encodings.
            let return_type = self.read_var_type(StorageClass::empty())?;
            let params = self.read_func_params()?;
            let func = self.types.alloc(Type::NonMemberFunction(
                CallingConv::Cdecl,
                params,
                return_type,
            ));
            return Ok(self.types.alloc(Type::Ptr(func, sc)));
        }

        let c = self.cursor.get();
        match c {
            Some(b'T') => {
                let name = self.read_name()?;
                Ok(self.types.alloc(Type::Union(name, sc)))
            }
            Some(b'U') => {
                let name = self.read_name()?;
                Ok(self.types.alloc(Type::Struct(name, sc)))
            }
            Some(b'V') => {
                let name = self.read_name()?;
                Ok(self.types.alloc(Type::Class(name, sc)))
            }
            Some(b'A') => {
                let pointee = self.read_pointee()?;
                Ok(self.types.alloc(Type::Ref(pointee, sc)))
            }
            Some(b'P') => {
                let pointee = self.read_pointee()?;
                Ok(self.types.alloc(Type::Ptr(pointee, sc)))
            }
            Some(b'Q') => {
                let pointee = self.read_pointee()?;
                Ok(self
                    .types
                    .alloc(Type::Ptr(pointee, sc | StorageClass::CONST)))
            }
            Some(b'Y') => self.read_array(sc),
            _ => {
                self.cursor.unget(c);
                self.read_prim_type(sc)
            }
        }
    }

    // A pointee carries the 64-bit marker and then its own storage class.
    fn read_pointee(&mut self) -> Result<Key<Type<'a>>> {
        self.expect(b"E")?;
        let sc = self.read_storage_class();
        self.read_var_type(sc)
    }

    fn read_array(&mut self, sc: StorageClass) -> Result<Key<Type<'a>>> {
        let dimension = self.read_number()?;
        if dimension <= 0 {
            return Err(self.fail_args(format_args!("invalid array dimension: {}", dimension)));
        }
        let len = self.read_number()?;
        let inner = self.read_array_tail(dimension - 1)?;
        Ok(self.types.alloc(Type::Array(len, inner, sc)))
    }

    // The remaining dimensions of an array, then the element type.  The
    // element may be wrapped in a `$$C` cv-qualification.
    fn read_array_tail(&mut self, remaining: i32) -> Result<Key<Type<'a>>> {
        if remaining > 0 {
            let len = self.read_number()?;
            let inner = self.read_array_tail(remaining - 1)?;
            return Ok(self
                .types
                .alloc(Type::Array(len, inner, StorageClass::empty())));
        }

        let elem_sc = if self.cursor.consume(b"$$C") {
            if self.cursor.consume(b"B") {
                StorageClass::CONST
            } else if self.cursor.consume(b"C") || self.cursor.consume(b"D") {
                StorageClass::CONST | StorageClass::VOLATILE
            } else if self.cursor.consume(b"A") {
                StorageClass::empty()
            } else {
                return Err(self.fail("unknown storage class"));
            }
        } else {
            StorageClass::empty()
        };
        self.read_var_type(elem_sc)
    }

    fn read_prim_type(&mut self, sc: StorageClass) -> Result<Key<Type<'a>>> {
        let t = match self.cursor.get() {
            Some(b'X') => Type::Void(sc),
            Some(b'D') => Type::Char(sc),
            Some(b'C') => Type::Schar(sc),
            Some(b'E') => Type::Uchar(sc),
            Some(b'F') => Type::Short(sc),
            Some(b'G') => Type::Ushort(sc),
            Some(b'H') => Type::Int(sc),
            Some(b'I') => Type::Uint(sc),
            Some(b'J') => Type::Long(sc),
            Some(b'K') => Type::Ulong(sc),
            Some(b'M') => Type::Float(sc),
            Some(b'N') => Type::Double(sc),
            Some(b'O') => Type::Ldouble(sc),
            Some(b'_') => match self.cursor.get() {
                Some(b'N') => Type::Bool(sc),
                Some(b'J') => Type::Llong(sc),
                Some(b'K') => Type::Ullong(sc),
                Some(b'W') => Type::Wchar(sc),
                _ => return Err(self.fail("unknown primitive type")),
            },
            _ => return Err(self.fail("unknown primitive type")),
        };
        Ok(self.types.alloc(t))
    }
}

/// Demangles one symbol in a single call.
pub fn demangle(input: &str, flags: DemangleFlags) -> Result<String> {
    serialize(&parse(input)?, flags)
}

/// Parses one mangled symbol into its AST.
pub fn parse(input: &str) -> Result<ParseResult<'_>> {
    let state = ParserState {
        cursor: Cursor::new(input.as_bytes()),
        types: Arena::default(),
        names: Arena::default(),
        memorized_names: Vec::with_capacity(10),
    };
    state.parse()
}

/// Renders a parsed symbol as a declaration.
pub fn serialize(ast: &ParseResult<'_>, flags: DemangleFlags) -> Result<String> {
    let mut w = Vec::new();
    {
        let mut serializer = Serializer {
            flags,
            ast,
            w: &mut w,
        };
        serializer.serialize()?;
    }
    Ok(String::from_utf8(w)?)
}

// "?0Foo" names the constructor of Foo and "?1Foo" its destructor.  For a
// template class the marker precedes the `?$` component; the stem is the
// bare class name either way.
fn structor_stem<'a>(ident: &'a [u8], marker: &[u8]) -> Option<&'a [u8]> {
    if !ident.starts_with(marker) {
        return None;
    }
    let stem = &ident[marker.len()..];
    if stem.starts_with(b"?$") {
        Some(&stem[2..])
    } else {
        Some(stem)
    }
}

// Converts an AST to a string.
//
// Converting an AST representing a C++ type to a string is tricky due to
// the bad grammar of the C++ declaration inherited from C.  You have to
// construct a string from inside to outside.  For example, if a type X is
// a pointer to a function returning int, the order you create a string
// becomes something like this:
//
//   (1) X is a pointer: *X
//   (2) (1) is a function returning int: int (*X)()
//
// So you cannot construct a result just by appending strings to a result.
//
// To deal with this, we split the writer into two.  write_pre() writes
// the "first half" of a type declaration, and write_post() writes the
// "second half".  For example, write_pre() writes a return type for a
// function and write_post() writes the parameter list.
struct Serializer<'a, 'b> {
    flags: DemangleFlags,
    ast: &'b ParseResult<'a>,
    w: &'b mut Vec<u8>,
}

impl<'a, 'b> Serializer<'a, 'b> {
    fn serialize(&mut self) -> Result<()> {
        let ast = self.ast;
        if !self.flags.contains(DemangleFlags::NAME_ONLY) {
            self.write_pre(ast.symbol_type)?;
            self.write_space()?;
        }
        self.write_name(&ast.symbol)?;
        if !self.flags.contains(DemangleFlags::NAME_ONLY) {
            self.write_post(ast.symbol_type)?;
        }
        Ok(())
    }

    fn is_function_or_array(&self, key: Key<Type<'a>>) -> bool {
        match self.ast.types[key] {
            Type::MemberFunction(..) | Type::NonMemberFunction(..) | Type::Array(..) => true,
            _ => false,
        }
    }

    // "[]" and "()" bind tighter than "*", so a pointer to an array or to
    // a function needs its own parentheses.
    fn write_indirection(&mut self, inner: Key<Type<'a>>, op: &[u8]) -> Result<()> {
        self.write_pre(inner)?;
        self.write_space()?;
        if self.is_function_or_array(inner) {
            write!(self.w, "(")?;
        }
        self.w.write_all(op)?;
        Ok(())
    }

    // Write the "first half" of a given type.
    fn write_pre(&mut self, key: Key<Type<'a>>) -> Result<()> {
        let ast = self.ast;
        let storage_class = match &ast.types[key] {
            Type::Unknown | Type::None => return Ok(()),
            Type::MemberFunction(_, _, _, _, return_type) => {
                self.write_pre(*return_type)?;
                return Ok(());
            }
            Type::NonMemberFunction(_, _, return_type) => {
                self.write_pre(*return_type)?;
                return Ok(());
            }
            Type::Ptr(inner, sc) => {
                self.write_indirection(*inner, b"*")?;
                *sc
            }
            Type::Ref(inner, sc) => {
                self.write_indirection(*inner, b"&")?;
                *sc
            }
            Type::Array(_, inner, sc) => {
                self.write_pre(*inner)?;
                *sc
            }
            Type::Struct(names, sc) => {
                write!(self.w, "struct ")?;
                self.write_name(names)?;
                *sc
            }
            Type::Union(names, sc) => {
                write!(self.w, "union ")?;
                self.write_name(names)?;
                *sc
            }
            Type::Class(names, sc) => {
                write!(self.w, "class ")?;
                self.write_name(names)?;
                *sc
            }
            Type::Enum(names, sc) => {
                write!(self.w, "enum ")?;
                self.write_name(names)?;
                *sc
            }
            Type::Void(sc) => {
                write!(self.w, "void")?;
                *sc
            }
            Type::Bool(sc) => {
                write!(self.w, "bool")?;
                *sc
            }
            Type::Char(sc) => {
                write!(self.w, "char")?;
                *sc
            }
            Type::Schar(sc) => {
                write!(self.w, "signed char")?;
                *sc
            }
            Type::Uchar(sc) => {
                write!(self.w, "unsigned char")?;
                *sc
            }
            Type::Short(sc) => {
                write!(self.w, "short")?;
                *sc
            }
            Type::Ushort(sc) => {
                write!(self.w, "unsigned short")?;
                *sc
            }
            Type::Int(sc) => {
                write!(self.w, "int")?;
                *sc
            }
            Type::Uint(sc) => {
                write!(self.w, "unsigned int")?;
                *sc
            }
            Type::Long(sc) => {
                write!(self.w, "long")?;
                *sc
            }
            Type::Ulong(sc) => {
                write!(self.w, "unsigned long")?;
                *sc
            }
            Type::Llong(sc) => {
                write!(self.w, "long long")?;
                *sc
            }
            Type::Ullong(sc) => {
                write!(self.w, "unsigned long long")?;
                *sc
            }
            Type::Wchar(sc) => {
                write!(self.w, "wchar_t")?;
                *sc
            }
            Type::Float(sc) => {
                write!(self.w, "float")?;
                *sc
            }
            Type::Double(sc) => {
                write!(self.w, "double")?;
                *sc
            }
            Type::Ldouble(sc) => {
                write!(self.w, "long double")?;
                *sc
            }
            Type::Varargs => {
                write!(self.w, "...")?;
                return Ok(());
            }
        };

        if storage_class.contains(StorageClass::CONST) {
            self.write_space()?;
            write!(self.w, "const")?;
        }

        Ok(())
    }

    // Write the "second half" of a given type.
    fn write_post(&mut self, key: Key<Type<'a>>) -> Result<()> {
        let ast = self.ast;
        match &ast.types[key] {
            Type::MemberFunction(_, _, params, sc, return_type) => {
                write!(self.w, "(")?;
                self.write_types(&params.types)?;
                write!(self.w, ")")?;
                if sc.contains(StorageClass::CONST) {
                    write!(self.w, " const")?;
                }
                self.write_post(*return_type)?;
            }
            Type::NonMemberFunction(_, params, return_type) => {
                write!(self.w, "(")?;
                self.write_types(&params.types)?;
                write!(self.w, ")")?;
                self.write_post(*return_type)?;
            }
            Type::Ptr(inner, _) | Type::Ref(inner, _) => {
                if self.is_function_or_array(*inner) {
                    write!(self.w, ")")?;
                }
                self.write_post(*inner)?;
            }
            Type::Array(len, inner, _) => {
                write!(self.w, "[{}]", len)?;
                self.write_post(*inner)?;
            }
            _ => {}
        }
        Ok(())
    }

    // Write a function or template parameter list.
    fn write_types(&mut self, types: &[Key<Type<'a>>]) -> Result<()> {
        for (idx, &param) in types.iter().enumerate() {
            if idx > 0 {
                write!(self.w, ",")?;
                if self.flags.contains(DemangleFlags::SPACE_AFTER_COMMA) {
                    write!(self.w, " ")?;
                }
            }
            self.write_pre(param)?;
            self.write_post(param)?;
        }
        Ok(())
    }

    fn write_one_name(&mut self, key: Key<Name<'a>>) -> Result<()> {
        let ast = self.ast;
        let name = &ast.names[key];
        self.w.write_all(name.ident)?;
        if !name.template_params.types.is_empty() {
            self.write_tmpl_params(&name.template_params)?;
        }
        Ok(())
    }

    // Writes a qualified name, outer components first.  The terminal
    // component may rewrite into a constructor or destructor.
    fn write_name(&mut self, seq: &NameSequence<'a>) -> Result<()> {
        let (last, scope) = match seq.names.split_last() {
            Some(pair) => pair,
            None => return Ok(()),
        };

        for &key in scope {
            self.write_one_name(key)?;
            write!(self.w, "::")?;
        }

        let ast = self.ast;
        let name = &ast.names[*last];
        if let Some(stem) = structor_stem(name.ident, b"?0") {
            self.w.write_all(stem)?;
            if !name.template_params.types.is_empty() {
                self.write_tmpl_params(&name.template_params)?;
            }
            write!(self.w, "::")?;
            self.w.write_all(stem)?;
        } else if let Some(stem) = structor_stem(name.ident, b"?1") {
            self.w.write_all(stem)?;
            if !name.template_params.types.is_empty() {
                self.write_tmpl_params(&name.template_params)?;
            }
            write!(self.w, "::~")?;
            self.w.write_all(stem)?;
        } else {
            self.write_one_name(*last)?;
        }
        Ok(())
    }

    fn write_tmpl_params(&mut self, params: &Params<'a>) -> Result<()> {
        write!(self.w, "<")?;
        self.write_types(&params.types)?;
        if self.w.last() == Some(&b'>') {
            write!(self.w, " ")?;
        }
        write!(self.w, ">")?;
        Ok(())
    }

    // Separates two words.  Never doubles and never ends up in front of
    // punctuation.
    fn write_space(&mut self) -> Result<()> {
        if let Some(&c) = self.w.last() {
            if c.is_ascii_alphabetic() {
                write!(self.w, " ")?;
            }
        }
        Ok(())
    }
}
