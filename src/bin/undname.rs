use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("{} <symbol>", args[0]);
        process::exit(1);
    }

    match undname::demangle(&args[1], undname::DemangleFlags::COMPLETE) {
        Ok(s) => println!("{}", s),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
