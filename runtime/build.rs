use capnpc::CompilerCommand;

fn main() {
    CompilerCommand::new()
        .file("package.capnp")
        .run()
        .expect("error generating code from Cap'n Proto schema!");
}
