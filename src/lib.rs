pub mod compiler;

#[cfg(test)]
mod tests;
