fn main() {
    focuspal_lib::run()
}
