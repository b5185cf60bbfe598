fn main() {
    text2sql_lib::run()
}
