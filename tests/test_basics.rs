use undname::{demangle, parse, DemangleFlags, StorageClass, Type};

fn expect(input: &str, reference: &str) {
    match demangle(input, DemangleFlags::COMPLETE) {
        Ok(demangled) => assert_eq!(demangled, reference, "input: {:?}", input),
        Err(err) => panic!("demangling {:?} failed: {}", input, err),
    }
}

fn expect_error(input: &str, needle: &str) {
    match demangle(input, DemangleFlags::COMPLETE) {
        Ok(demangled) => panic!("expected {:?} to fail, got {:?}", input, demangled),
        Err(err) => {
            let msg = err.to_string();
            assert!(
                msg.contains(needle),
                "error {:?} for input {:?} does not mention {:?}",
                msg,
                input,
                needle
            );
        }
    }
}

#[test]
fn global_variables() {
    expect("?x@@3HA", "int x");
    expect("?x@ns@@3HA", "int ns::x");
    expect("?x@a@b@c@@3HA", "int c::b::a::x");
    expect("?d@@3NA", "double d");
    expect("?ld@@3OA", "long double ld");
    expect("?uc@@3EA", "unsigned char uc");
    expect("?b@@3_NA", "bool b");
    expect("?w@@3_WA", "wchar_t w");
    expect("?ll@@3_JA", "long long ll");
    expect("?ull@@3_KA", "unsigned long long ull");
}

#[test]
fn pointers_and_references() {
    expect("?x@@3PEAHEA", "int *x");
    expect("?x@@3PEBHEB", "int const *x");
    expect("?q@@3QEBHEB", "int const *const q");
    expect("?r@@3AEAHA", "int &r");
    expect("?cr@@3AEBHB", "int const &cr");
    expect("?pp@@3PEAPEAHEA", "int **pp");
    // volatile parses but is not part of the rendition
    expect("?v@@3PECHEC", "int *v");
}

#[test]
fn tagged_types() {
    expect("?s@@3UPoint@@A", "struct Point s");
    expect("?u@@3TThing@@A", "union Thing u");
    expect("?c@@3VKlass@@A", "class Klass c");
    expect("?e@@3W4Color@ns@@A", "enum ns::Color e");
    expect("?p@@3PEAUPoint@@EA", "struct Point *p");
}

#[test]
fn functions() {
    expect("?f@@YAHXZ", "int f(void)");
    expect("?g@@YAXH@Z", "void g(int)");
    expect("?h@@YAHHN@Z", "int h(int,double)");
    expect("?e@@YAH@Z", "int e()");
    expect("?s@@YGXXZ", "void s(void)");
    expect("?fc@@YIXXZ", "void fc(void)");
    expect("?f@@YA?BHXZ", "int const f(void)");
    expect("?f@@YAXVFoo@@@Z", "void f(class Foo)");
    expect("?p@@YAHPEBDZZ", "int p(char const *,...)");
}

#[test]
fn member_functions() {
    expect("?m@Foo@@QEAAHXZ", "int Foo::m(void)");
    expect("?m@Foo@@QEBAHXZ", "int Foo::m(void) const");
    expect("?v@Foo@@MEAAXXZ", "void Foo::v(void)");
    expect("?t@Foo@@QEAEHXZ", "int Foo::t(void)");
    expect("?get@Obj@@QEAA?AVKlass@@XZ", "class Klass Obj::get(void)");
}

#[test]
fn structors() {
    expect("??0Klass@@QEAA@XZ", "Klass::Klass(void)");
    expect("??1Klass@@QEAA@XZ", "Klass::~Klass(void)");
    expect("??0Inner@Outer@@QEAA@XZ", "Outer::Inner::Inner(void)");
    expect("??0Klass@@QEAA@H@Z", "Klass::Klass(int)");
    expect("??0?$Vec@H@@QEAA@XZ", "Vec<int>::Vec(void)");
    expect("??1?$Vec@H@@QEAA@XZ", "Vec<int>::~Vec(void)");
}

#[test]
fn templates() {
    expect("?v@@3V?$Pair@HN@@A", "class Pair<int,double> v");
    expect("?v@@3V?$Outer@V?$Inner@H@@@@A", "class Outer<class Inner<int> > v");
    expect("?v@@3V?$A@PEAH@@A", "class A<int *> v");
    expect("?f@?$C@H@@QEAAHXZ", "int C<int>::f(void)");
}

#[test]
fn arrays() {
    expect("?m@@3Y112KA", "unsigned long m[2][3]");
    expect("?b@@3Y0BI@HA", "int b[24]");
    expect("?p@@3PEAY01HEA", "int (*p)[2]");
    expect("?c@@3PEAY01$$CBHEA", "int const (*c)[2]");
}

#[test]
fn pointers_to_functions() {
    expect("?p@@3P6AHH@ZEA", "int (*p)(int)");
    expect("?cb@@3P6AXXZEA", "void (*cb)(void)");
    expect("?h@@YAXP6AHH@Z@Z", "void h(int (*)(int))");
}

#[test]
fn name_back_references() {
    expect("?x@0@3HA", "int x::x");
    expect("?a@b@1@3HA", "int b::b::a");
    expect_error("?x@9@3HA", "name reference too large");
}

#[test]
fn type_back_references() {
    expect("?f@@YAXVFoo@@0@Z", "void f(class Foo,class Foo)");
    expect(
        "?f@@YAXUA@@VB@@10@Z",
        "void f(struct A,class B,class B,struct A)",
    );
    // single-letter codes are not memorized
    expect_error("?f@@YAXH0@Z", "invalid backreference");
}

#[test]
fn unmangled_names_pass_through() {
    expect("main", "main");
    expect("", "");
    expect("_ZN3foo3barEv", "_ZN3foo3barEv");
}

#[test]
fn missing_type_encoding() {
    expect("?x@@", "x");
}

#[test]
fn parse_errors() {
    expect_error("?", "read_string: missing '@'");
    expect_error("?abc", "read_string: missing '@'");
    expect_error("?x@@3LA", "unknown primitive type");
    expect_error("?x@@5HA", "unknown func class");
    expect_error("?f@@Y9HXZ", "unknown calling convention");
    expect_error("?m@Foo@@QAAHXZ", "E expected");
    expect_error("?a@@3YQHA", "bad number");
    expect_error("?a@@3Y?0HA", "invalid array dimension");
    expect_error("?a@@3Y@HA", "invalid array dimension");
    expect_error("?c@@3PEAY01$$CXHEA", "unknown storage class");
    expect_error("?f@@YA?ZHXZ", "unknown storage class");
}

#[test]
fn error_reports_offset() {
    let err = demangle("?x@@3LA", DemangleFlags::COMPLETE).unwrap_err();
    assert!(err.offset().is_some());
}

#[test]
fn name_only_flag() {
    let expect_name = |input, reference: &str| {
        assert_eq!(
            demangle(input, DemangleFlags::NAME_ONLY).unwrap(),
            reference
        );
    };
    expect_name("?x@ns@@3HA", "ns::x");
    expect_name("?m@Foo@@QEBAHXZ", "Foo::m");
    expect_name("??0Klass@@QEAA@XZ", "Klass::Klass");
}

#[test]
fn space_after_comma_flag() {
    let expect_spaced = |input, reference: &str| {
        assert_eq!(
            demangle(input, DemangleFlags::SPACE_AFTER_COMMA).unwrap(),
            reference
        );
    };
    expect_spaced("?h@@YAHHN@Z", "int h(int, double)");
    expect_spaced("?v@@3V?$Pair@HN@@A", "class Pair<int, double> v");
}

#[test]
fn parses_into_arena_backed_ast() {
    let result = parse("?x@ns@@3HA").unwrap();
    assert_eq!(result.symbol.names.len(), 2);
    assert_eq!(result.names[result.symbol.names[0]].ident, &b"ns"[..]);
    assert_eq!(result.names[result.symbol.names[1]].ident, &b"x"[..]);
    assert_eq!(
        result.types[result.symbol_type],
        Type::Int(StorageClass::empty())
    );
    assert!(!result.types.is_empty());
}

#[test]
fn output_has_no_stray_spaces() {
    let inputs = [
        "?x@@3HA",
        "?x@ns@@3HA",
        "?x@@3PEAHEA",
        "?x@@3PEBHEB",
        "?q@@3QEBHEB",
        "?f@@YAHXZ",
        "?g@@YAXH@Z",
        "?h@@YAXP6AHH@Z@Z",
        "?m@Foo@@QEBAHXZ",
        "?m@@3Y112KA",
        "?p@@3PEAY01HEA",
        "?v@@3V?$Outer@V?$Inner@H@@@@A",
        "??0?$Vec@H@@QEAA@XZ",
        "?p@@YAHPEBDZZ",
    ];
    for input in inputs.iter() {
        let out = demangle(input, DemangleFlags::COMPLETE).unwrap();
        assert!(
            !out.contains("  "),
            "doubled space in {:?} from {:?}",
            out,
            input
        );
        for bad in [" )", " ,", " ]", " ["].iter() {
            assert!(
                !out.contains(bad),
                "space before punctuation in {:?} from {:?}",
                out,
                input
            );
        }
        assert!(!out.starts_with(' '), "leading space in {:?}", out);
        assert!(!out.ends_with(' '), "trailing space in {:?}", out);
    }
}
