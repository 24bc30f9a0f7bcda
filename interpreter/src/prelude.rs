//! The standard prelude, written in TLang itself and evaluated once
//! into the shared root scope when an interpreter is built.
//!
//! `#` is the prelude namespace hash; its FFI surface (`C`,
//! `CFunction`, `CType`) is present but stubbed to errors in builds
//! without a C bridge.

pub(crate) const SOURCE: &str = r#"
let # = {
    "@class": "Prelude",
    "version": "0.3.0",
    "C": {
        "@[]": func(sym, self) {
            ret error("ffi: symbol lookup unavailable in this build: " + string(sym));
        }
    },
    "CFunction": func(id, retType) {
        ret error("ffi: CFunction unavailable in this build");
    },
    "CType": func(raw, typeC) {
        ret error("ffi: CType unavailable in this build");
    }
};

let range = func(n) {
    ret array(n, 0, _ { args[0]; });
};

let map = func(arr, f) {
    let result = [];
    loop v in arr {
        result = append(result, f(v));
    };
    ret result;
};

let filter = func(arr, f) {
    let result = [];
    loop v in arr {
        if (f(v)) {
            result = append(result, v);
        };
    };
    ret result;
};

let reduce = func(arr, acc, f) {
    let result = acc;
    loop v in arr {
        result = f(result, v);
    };
    ret result;
};

let contains = func(arr, x) {
    loop v in arr {
        if (v == x) {
            ret true;
        };
    };
    ret false;
};

let reverse = func(arr) {
    let result = [];
    let i = len(arr) - 1;
    loop (i >= 0) {
        result = append(result, arr[i]);
        i -= 1;
    };
    ret result;
};

let min = func(a, b) {
    if (a < b) {
        ret a;
    };
    ret b;
};

let max = func(a, b) {
    if (a > b) {
        ret a;
    };
    ret b;
};

let abs = func(x) {
    if (x < 0) {
        ret -x;
    };
    ret x;
};

let new = func(template) {
    ret {"@template": template};
};
"#;
